use super::{epoch_ms, Bucket, RateLimitStore};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// How often the background sweep drops expired buckets, independent of any
/// class's window length
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// In-process counter store.
///
/// Used when no shared store is reachable, or for single-instance deploys.
/// The DashMap entry lock makes each increment an atomic read-modify-write
/// per key. Memory is bounded by the background sweep, which removes every
/// bucket whose window has passed.
pub struct LocalStore {
    buckets: Arc<DashMap<String, Bucket>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(interval: Duration) -> Self {
        let buckets: Arc<DashMap<String, Bucket>> = Arc::new(DashMap::new());

        let sweeper = {
            let buckets = Arc::clone(&buckets);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The first tick fires immediately; skip it so a fresh store
                // does not sweep before anything exists.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let now = epoch_ms();
                    buckets.retain(|_, bucket| bucket.reset_at > now);
                    trace!(active = buckets.len(), "swept expired rate limit buckets");
                }
            })
        };

        Self {
            buckets,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Number of tracked buckets (for tests/monitoring)
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for LocalStore {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<Bucket> {
        let now = epoch_ms();
        let mut entry = self
            .buckets
            .entry(key.to_owned())
            .or_insert(Bucket { count: 0, reset_at: 0 });

        if entry.count == 0 || now >= entry.reset_at {
            // First increment for this key, or the window has passed:
            // replace the record wholesale.
            *entry = Bucket {
                count: 1,
                reset_at: now + window_ms,
            };
        } else {
            entry.count += 1;
        }

        Ok(*entry)
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.buckets.remove(key);
        Ok(())
    }

    async fn cleanup(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
            debug!("local rate limit store sweeper stopped");
        }
    }
}

impl Drop for LocalStore {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweeper.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
