use crate::error::{RateLimitError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Rate limit class - which bucket of endpoints a request falls into
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LimitClass {
    /// Login, signup, password reset
    Auth,
    /// General API traffic, including AI assistant calls
    Api,
    /// Media and attachment uploads
    Upload,
    /// Everything without a more specific class
    Default,
}

impl LimitClass {
    pub const ALL: [LimitClass; 4] = [
        LimitClass::Auth,
        LimitClass::Api,
        LimitClass::Upload,
        LimitClass::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::Auth => "auth",
            LimitClass::Api => "api",
            LimitClass::Upload => "upload",
            LimitClass::Default => "default",
        }
    }

    /// Prefix for the environment variables configuring this class
    fn env_prefix(&self) -> &'static str {
        match self {
            LimitClass::Auth => "RATE_LIMIT_AUTH",
            LimitClass::Api => "RATE_LIMIT_API",
            LimitClass::Upload => "RATE_LIMIT_UPLOAD",
            LimitClass::Default => "RATE_LIMIT_DEFAULT",
        }
    }

    /// Hard-coded fallbacks when the environment is silent
    fn fallback(&self) -> (u32, u64) {
        match self {
            LimitClass::Auth => (5, 900_000),
            LimitClass::Api => (100, 3_600_000),
            LimitClass::Upload => (10, 3_600_000),
            LimitClass::Default => (60, 60_000),
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            LimitClass::Auth => "Too many authentication attempts, please try again later",
            LimitClass::Api => "API rate limit exceeded, please slow down",
            LimitClass::Upload => "Upload limit reached, please try again later",
            LimitClass::Default => "Too many requests, please try again later",
        }
    }
}

impl FromStr for LimitClass {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auth" => Ok(LimitClass::Auth),
            "api" => Ok(LimitClass::Api),
            "upload" => Ok(LimitClass::Upload),
            "default" => Ok(LimitClass::Default),
            other => Err(RateLimitError::Configuration(format!(
                "unknown rate limit class: {other}"
            ))),
        }
    }
}

/// What to do when the store itself fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Allow the request (availability over strictness)
    Open,
    /// Reject the request (strictness over availability)
    Closed,
}

/// Effective configuration for one rate limit class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Maximum number of requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Message rendered to rejected callers
    pub message: String,
    /// HTTP status code for rejections
    pub status_code: u16,
    /// Behavior when the store is unreachable
    pub failure_policy: FailurePolicy,
}

impl LimitConfig {
    /// Apply a per-call override, override fields win
    pub fn merged(&self, over: &LimitOverride) -> LimitConfig {
        LimitConfig {
            max_requests: over.max_requests.unwrap_or(self.max_requests),
            window_ms: over.window_ms.unwrap_or(self.window_ms),
            message: over.message.clone().unwrap_or_else(|| self.message.clone()),
            status_code: over.status_code.unwrap_or(self.status_code),
            failure_policy: over.failure_policy.unwrap_or(self.failure_policy),
        }
    }

    fn validate(&self, class: LimitClass) -> Result<()> {
        if self.max_requests < 1 {
            return Err(RateLimitError::Configuration(format!(
                "{}: max_requests must be >= 1",
                class.as_str()
            )));
        }
        if self.window_ms < 1 {
            return Err(RateLimitError::Configuration(format!(
                "{}: window_ms must be >= 1",
                class.as_str()
            )));
        }
        Ok(())
    }
}

/// Per-call override for a class's defaults, all fields optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitOverride {
    #[serde(default)]
    pub max_requests: Option<u32>,
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub failure_policy: Option<FailurePolicy>,
}

/// Resolved configuration for every rate limit class
#[derive(Debug, Clone)]
pub struct Limits {
    auth: LimitConfig,
    api: LimitConfig,
    upload: LimitConfig,
    default: LimitConfig,
}

impl Limits {
    /// Resolve all classes from the environment, falling back to the
    /// built-in defaults. Validation happens here, never at request time.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            auth: class_from_env(LimitClass::Auth)?,
            api: class_from_env(LimitClass::Api)?,
            upload: class_from_env(LimitClass::Upload)?,
            default: class_from_env(LimitClass::Default)?,
        })
    }

    pub fn get(&self, class: LimitClass) -> &LimitConfig {
        match class {
            LimitClass::Auth => &self.auth,
            LimitClass::Api => &self.api,
            LimitClass::Upload => &self.upload,
            LimitClass::Default => &self.default,
        }
    }

    /// Replace one class's configuration, validating the replacement
    pub fn with_class(mut self, class: LimitClass, config: LimitConfig) -> Result<Self> {
        config.validate(class)?;
        match class {
            LimitClass::Auth => self.auth = config,
            LimitClass::Api => self.api = config,
            LimitClass::Upload => self.upload = config,
            LimitClass::Default => self.default = config,
        }
        Ok(self)
    }
}

impl Default for Limits {
    /// Built-in fallbacks only, ignoring the environment
    fn default() -> Self {
        Self {
            auth: builtin_config(LimitClass::Auth),
            api: builtin_config(LimitClass::Api),
            upload: builtin_config(LimitClass::Upload),
            default: builtin_config(LimitClass::Default),
        }
    }
}

fn builtin_config(class: LimitClass) -> LimitConfig {
    let (max_requests, window_ms) = class.fallback();
    LimitConfig {
        max_requests,
        window_ms,
        message: class.default_message().to_string(),
        status_code: 429,
        failure_policy: FailurePolicy::Open,
    }
}

fn class_from_env(class: LimitClass) -> Result<LimitConfig> {
    let prefix = class.env_prefix();
    let (fallback_max, fallback_window) = class.fallback();

    let config = LimitConfig {
        max_requests: env_u32(&format!("{prefix}_MAX"), fallback_max)?,
        window_ms: env_u64(&format!("{prefix}_WINDOW_MS"), fallback_window)?,
        message: env::var(format!("{prefix}_MESSAGE"))
            .unwrap_or_else(|_| class.default_message().to_string()),
        status_code: 429,
        failure_policy: if env_flag(&format!("{prefix}_FAIL_CLOSED")) {
            FailurePolicy::Closed
        } else {
            FailurePolicy::Open
        },
    };
    config.validate(class)?;
    Ok(config)
}

fn env_u32(name: &str, fallback: u32) -> Result<u32> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            RateLimitError::Configuration(format!("{name} must be an integer, got {raw:?}"))
        }),
        Err(_) => Ok(fallback),
    }
}

fn env_u64(name: &str, fallback: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            RateLimitError::Configuration(format!("{name} must be an integer, got {raw:?}"))
        }),
        Err(_) => Ok(fallback),
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_fallbacks() {
        let limits = Limits::default();

        assert_eq!(limits.get(LimitClass::Auth).max_requests, 5);
        assert_eq!(limits.get(LimitClass::Auth).window_ms, 900_000);
        assert_eq!(limits.get(LimitClass::Api).max_requests, 100);
        assert_eq!(limits.get(LimitClass::Api).window_ms, 3_600_000);
        assert_eq!(limits.get(LimitClass::Upload).max_requests, 10);
        assert_eq!(limits.get(LimitClass::Upload).window_ms, 3_600_000);
        assert_eq!(limits.get(LimitClass::Default).max_requests, 60);
        assert_eq!(limits.get(LimitClass::Default).window_ms, 60_000);

        for class in LimitClass::ALL {
            let config = limits.get(class);
            assert_eq!(config.status_code, 429);
            assert_eq!(config.failure_policy, FailurePolicy::Open);
        }
    }

    #[test]
    fn test_merge_override_wins() {
        let base = builtin_config(LimitClass::Api);
        let over = LimitOverride {
            max_requests: Some(10),
            window_ms: Some(1_000),
            ..Default::default()
        };

        let merged = base.merged(&over);
        assert_eq!(merged.max_requests, 10);
        assert_eq!(merged.window_ms, 1_000);
        // Untouched fields keep the class defaults
        assert_eq!(merged.message, base.message);
        assert_eq!(merged.status_code, 429);
        assert_eq!(merged.failure_policy, FailurePolicy::Open);
    }

    #[test]
    fn test_validation_rejects_zero() {
        let mut config = builtin_config(LimitClass::Auth);
        config.max_requests = 0;
        assert!(matches!(
            config.validate(LimitClass::Auth),
            Err(RateLimitError::Configuration(_))
        ));

        let mut config = builtin_config(LimitClass::Auth);
        config.window_ms = 0;
        assert!(config.validate(LimitClass::Auth).is_err());

        let limits = Limits::default();
        let mut bad = builtin_config(LimitClass::Api);
        bad.max_requests = 0;
        assert!(limits.with_class(LimitClass::Api, bad).is_err());
    }

    #[test]
    fn test_class_parsing() {
        assert_eq!("auth".parse::<LimitClass>().unwrap(), LimitClass::Auth);
        assert_eq!("upload".parse::<LimitClass>().unwrap(), LimitClass::Upload);
        assert!("premium".parse::<LimitClass>().is_err());
        assert_eq!(LimitClass::Default.as_str(), "default");
    }
}
