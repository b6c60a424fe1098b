use thiserror::Error;

/// Result type for rate limiter operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Rate limiter error types
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("rate limit store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("atomic increment script failed: {0}")]
    ScriptExecution(String),

    #[error("invalid rate limit configuration: {0}")]
    Configuration(String),

    #[error("internal rate limiter error: {0}")]
    Unknown(String),
}

impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
        {
            RateLimitError::StoreUnavailable(err.to_string())
        } else if matches!(
            err.kind(),
            redis::ErrorKind::NoScriptError | redis::ErrorKind::ResponseError
        ) {
            RateLimitError::ScriptExecution(err.to_string())
        } else {
            RateLimitError::Unknown(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RateLimitError::StoreUnavailable("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "rate limit store unavailable: connection refused"
        );

        let err = RateLimitError::Configuration("auth: max_requests must be >= 1".to_string());
        assert_eq!(
            err.to_string(),
            "invalid rate limit configuration: auth: max_requests must be >= 1"
        );
    }

    #[test]
    fn test_redis_error_classification() {
        let io_err: redis::RedisError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(
            RateLimitError::from(io_err),
            RateLimitError::StoreUnavailable(_)
        ));

        let script_err = redis::RedisError::from((
            redis::ErrorKind::NoScriptError,
            "script not loaded",
        ));
        assert!(matches!(
            RateLimitError::from(script_err),
            RateLimitError::ScriptExecution(_)
        ));
    }
}
