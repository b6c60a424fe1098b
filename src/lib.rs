//! Rate limiting core for the Planora event platform backend.
//!
//! Protects scarce endpoints (auth, AI assistant calls, uploads) with
//! fixed-window counters:
//!
//! - **Local store**: in-process buckets with a periodic sweep, the default
//! - **Shared store**: Redis-backed buckets incremented by an atomic Lua
//!   script, for multi-instance deployments
//!
//! The backend selects a store once at startup (shared when reachable,
//! local otherwise) and every store failure afterwards resolves through the
//! per-class failure policy, fail-open by default.
//!
//! # Example
//!
//! ```rust,no_run
//! use planora_ratelimit::{LimitClass, Limits, RateLimitService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let limits = Limits::from_env().expect("valid rate limit configuration");
//!
//!     // Probes Redis once; falls back to the local store when unreachable
//!     let service =
//!         RateLimitService::connect(limits, std::env::var("REDIS_URL").ok().as_deref()).await;
//!
//!     let decision = service
//!         .check_limit("auth:1.2.3.4:POST:/login", LimitClass::Auth, None)
//!         .await;
//!     assert!(decision.allowed);
//!
//!     // On shutdown signals
//!     service.cleanup().await;
//! }
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use config::{FailurePolicy, LimitClass, LimitConfig, LimitOverride, Limits};
pub use error::{RateLimitError, Result};
pub use middleware::{bucket_key, rate_limit_middleware, RateLimitMiddleware};
pub use service::{RateLimitDecision, RateLimitService};
pub use store::{Bucket, RateLimitStore};

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "planora_ratelimit=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
