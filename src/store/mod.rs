//! Counter stores backing the rate limiter.
//!
//! Two implementations of one contract: [`local::LocalStore`] keeps buckets
//! in process memory and is the default, [`redis::RedisStore`] shares buckets
//! across server instances. Callers never touch a bucket directly, only
//! through [`RateLimitStore::increment`] and [`RateLimitStore::reset`].

pub mod local;
pub mod redis;
pub mod scripts;

use crate::error::Result;
use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-key counter state for one rate limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Requests observed in the current window, starts at 1
    pub count: u64,
    /// Epoch-millisecond timestamp when the window ends
    pub reset_at: u64,
}

/// Contract for atomic counter stores.
///
/// `increment` must be atomic per key: concurrent callers on the same key
/// observe distinct, gapless counts and one agreed `reset_at` per window.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Bump the counter for `key`, starting a fresh window if the previous
    /// one has expired. Returns the updated bucket.
    async fn increment(&self, key: &str, window_ms: u64) -> Result<Bucket>;

    /// Clear the bucket for `key`; the next increment starts fresh.
    async fn reset(&self, key: &str) -> Result<()>;

    /// Release background resources (timers, connections). Idempotent.
    async fn cleanup(&self);
}

/// Current time as epoch milliseconds
pub(crate) fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
