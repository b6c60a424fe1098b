use super::scripts::INCREMENT_SCRIPT;
use super::{epoch_ms, Bucket, RateLimitStore};
use crate::error::{RateLimitError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use tracing::debug;

/// Namespace for persisted bucket keys
const KEY_PREFIX: &str = "planora:ratelimit:";

/// Upper bound on every round trip to the shared store. An elapsed timeout
/// is reported as `StoreUnavailable`, same as any other connection failure.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis-backed counter store shared by all server instances.
///
/// Each bucket is one key holding an integer count with a TTL equal to the
/// window. The increment script is compiled once at construction; Redis
/// caches it by SHA so every call after the first is an EVALSHA.
///
/// This store never makes policy decisions: every failure propagates to the
/// facade, which owns fail-open/fail-closed.
pub struct RedisStore {
    connection: ConnectionManager,
    increment: Script,
}

impl RedisStore {
    /// Connect to Redis and prepare the increment script.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = tokio::time::timeout(STORE_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                RateLimitError::StoreUnavailable("timed out connecting to redis".to_string())
            })??;

        Ok(Self {
            connection,
            increment: Script::new(INCREMENT_SCRIPT),
        })
    }

    /// Probe the connection, used once at startup for store selection.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        tokio::time::timeout(
            STORE_TIMEOUT,
            redis::cmd("PING").query_async::<_, ()>(&mut conn),
        )
        .await
        .map_err(|_| RateLimitError::StoreUnavailable("redis ping timed out".to_string()))?
        .map_err(RateLimitError::from)
    }

    fn storage_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<Bucket> {
        let storage_key = Self::storage_key(key);
        let mut conn = self.connection.clone();

        let reply = tokio::time::timeout(
            STORE_TIMEOUT,
            self.increment
                .key(&storage_key)
                .arg(window_ms)
                .invoke_async::<_, Vec<i64>>(&mut conn),
        )
        .await
        .map_err(|_| {
            RateLimitError::StoreUnavailable(format!("increment timed out for key {storage_key}"))
        })??;

        let (count, ttl_ms) = match reply.as_slice() {
            [count, ttl_ms] => (*count, *ttl_ms),
            other => {
                return Err(RateLimitError::ScriptExecution(format!(
                    "unexpected increment script reply: {other:?}"
                )))
            }
        };

        debug!(key = %storage_key, count, ttl_ms, "incremented shared bucket");

        // All replicas derive the window end from the store's TTL, so they
        // agree on it without sharing a clock.
        Ok(Bucket {
            count: count.max(0) as u64,
            reset_at: epoch_ms() + ttl_ms.max(0) as u64,
        })
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let storage_key = Self::storage_key(key);
        let mut conn = self.connection.clone();

        tokio::time::timeout(
            STORE_TIMEOUT,
            redis::cmd("DEL").arg(&storage_key).query_async::<_, ()>(&mut conn),
        )
        .await
        .map_err(|_| {
            RateLimitError::StoreUnavailable(format!("reset timed out for key {storage_key}"))
        })??;

        Ok(())
    }

    async fn cleanup(&self) {
        // ConnectionManager has no explicit close; the multiplexed
        // connection is torn down when the last clone drops.
        debug!("redis rate limit store released");
    }
}
