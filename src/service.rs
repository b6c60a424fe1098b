use crate::config::{FailurePolicy, LimitClass, LimitConfig, LimitOverride, Limits};
use crate::store::local::LocalStore;
use crate::store::redis::RedisStore;
use crate::store::{epoch_ms, RateLimitStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a rate limit check.
///
/// `limit`, `remaining` and `reset_secs` are `None` when the decision was
/// produced by the fail-open path and no quota information exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Effective per-window limit
    pub limit: Option<u32>,
    /// Requests left in the current window
    pub remaining: Option<u32>,
    /// Seconds until the window resets, rounded up
    pub reset_secs: Option<u64>,
}

impl RateLimitDecision {
    pub fn allowed(limit: u32, remaining: u32, reset_secs: u64) -> Self {
        Self {
            allowed: true,
            limit: Some(limit),
            remaining: Some(remaining),
            reset_secs: Some(reset_secs),
        }
    }

    pub fn denied(limit: u32, reset_secs: u64) -> Self {
        Self {
            allowed: false,
            limit: Some(limit),
            remaining: Some(0),
            reset_secs: Some(reset_secs),
        }
    }

    /// Allow-decision with no quota data, used when the store failed
    pub fn fail_open() -> Self {
        Self {
            allowed: true,
            limit: None,
            remaining: None,
            reset_secs: None,
        }
    }
}

/// Rate limiter facade.
///
/// Owns exactly one store, selected once at construction: the shared Redis
/// store when reachable, the local in-process store otherwise. Call sites
/// never branch on which variant is active.
pub struct RateLimitService {
    store: Arc<dyn RateLimitStore>,
    limits: Limits,
}

impl RateLimitService {
    /// Local-only service (tests, single-instance deploys)
    pub fn local(limits: Limits) -> Self {
        info!("initializing local rate limit store");
        Self {
            store: Arc::new(LocalStore::new()),
            limits,
        }
    }

    /// Probe the shared store and select a backend, once per process.
    ///
    /// A missing URL or a failed probe falls back to the local store with a
    /// warning; this constructor never fails.
    pub async fn connect(limits: Limits, redis_url: Option<&str>) -> Self {
        let store: Arc<dyn RateLimitStore> = match redis_url {
            Some(url) => match RedisStore::connect(url).await {
                Ok(store) => match store.ping().await {
                    Ok(()) => {
                        info!("redis reachable, using shared rate limit store");
                        Arc::new(store)
                    }
                    Err(err) => {
                        warn!(error = %err, "redis ping failed, falling back to local rate limit store");
                        Arc::new(LocalStore::new())
                    }
                },
                Err(err) => {
                    warn!(error = %err, "redis unavailable, falling back to local rate limit store");
                    Arc::new(LocalStore::new())
                }
            },
            None => {
                info!("no redis url configured, using local rate limit store");
                Arc::new(LocalStore::new())
            }
        };

        Self { store, limits }
    }

    /// Service over an externally constructed store (fakes in tests,
    /// pre-built connections in the backend's composition root).
    pub fn with_store(store: Arc<dyn RateLimitStore>, limits: Limits) -> Self {
        Self { store, limits }
    }

    /// Check and consume one request against `identifier`'s bucket.
    ///
    /// Never returns an error: store failures are resolved by the effective
    /// config's failure policy, fail-open by default.
    pub async fn check_limit(
        &self,
        identifier: &str,
        class: LimitClass,
        over: Option<&LimitOverride>,
    ) -> RateLimitDecision {
        let base = self.limits.get(class);
        let config = match over {
            Some(over) => base.merged(over),
            None => base.clone(),
        };

        match self.store.increment(identifier, config.window_ms).await {
            Ok(bucket) => {
                let reset_secs = seconds_until(bucket.reset_at);

                if bucket.count <= u64::from(config.max_requests) {
                    let remaining = (u64::from(config.max_requests) - bucket.count) as u32;
                    debug!(
                        identifier,
                        class = class.as_str(),
                        count = bucket.count,
                        remaining,
                        "rate limit check passed"
                    );
                    RateLimitDecision::allowed(config.max_requests, remaining, reset_secs)
                } else {
                    warn!(
                        identifier,
                        class = class.as_str(),
                        count = bucket.count,
                        limit = config.max_requests,
                        "rate limit exceeded"
                    );
                    RateLimitDecision::denied(config.max_requests, reset_secs)
                }
            }
            Err(err) => match config.failure_policy {
                FailurePolicy::Open => {
                    warn!(
                        error = %err,
                        identifier,
                        class = class.as_str(),
                        "rate limit store failure, allowing request"
                    );
                    RateLimitDecision::fail_open()
                }
                FailurePolicy::Closed => {
                    warn!(
                        error = %err,
                        identifier,
                        class = class.as_str(),
                        "rate limit store failure, rejecting request"
                    );
                    RateLimitDecision::denied(config.max_requests, config.window_ms.div_ceil(1000))
                }
            },
        }
    }

    /// Clear `identifier`'s bucket. Best-effort: failures are logged and
    /// swallowed, never raised to the caller.
    pub async fn reset_limit(&self, identifier: &str) {
        if let Err(err) = self.store.reset(identifier).await {
            warn!(error = %err, identifier, "failed to reset rate limit bucket");
        }
    }

    /// Release store resources; register against process shutdown signals.
    pub async fn cleanup(&self) {
        self.store.cleanup().await;
    }

    /// Effective defaults for a class, for adapters rendering rejections
    pub fn limit_config(&self, class: LimitClass) -> &LimitConfig {
        self.limits.get(class)
    }
}

/// Seconds from now until `reset_at`, rounded up so a caller that waits the
/// advertised time always lands in a new window
fn seconds_until(reset_at: u64) -> u64 {
    reset_at.saturating_sub(epoch_ms()).div_ceil(1000)
}
