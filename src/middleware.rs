use crate::config::{LimitClass, LimitOverride};
use crate::service::{RateLimitDecision, RateLimitService};
use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Request-boundary adapter: derives a bucket key from client identity plus
/// route, asks the facade for a decision, and turns it into either a
/// rejection or quota headers on the forwarded response.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    service: Arc<RateLimitService>,
    class: LimitClass,
    over: Option<LimitOverride>,
}

impl RateLimitMiddleware {
    pub fn new(service: Arc<RateLimitService>, class: LimitClass) -> Self {
        Self {
            service,
            class,
            over: None,
        }
    }

    /// Adapter with a per-route override on top of the class defaults
    pub fn with_override(
        service: Arc<RateLimitService>,
        class: LimitClass,
        over: LimitOverride,
    ) -> Self {
        Self {
            service,
            class,
            over: Some(over),
        }
    }

    /// Apply rate limiting to a request
    pub async fn apply(&self, request: Request, next: Next) -> Response {
        let client_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let key = bucket_key(
            self.class,
            &client_ip,
            request.method().as_str(),
            request.uri().path(),
        );

        let decision = self
            .service
            .check_limit(&key, self.class, self.over.as_ref())
            .await;

        if !decision.allowed {
            let config = self.service.limit_config(self.class);
            return rejection_response(&decision, config.status_code, &config.message);
        }

        debug!(key, remaining = ?decision.remaining, "request admitted");

        let response = next.run(request).await;
        attach_quota_headers(response, &decision)
    }
}

/// Bucket key convention: `{class}:{client_ip}:{METHOD}:{path}`
pub fn bucket_key(class: LimitClass, client_ip: &str, method: &str, path: &str) -> String {
    format!("{}:{}:{}:{}", class.as_str(), client_ip, method, path)
}

/// Build the rejection carrying quota hints. Only decision-derived fields
/// appear in the body; store internals never reach the client.
fn rejection_response(decision: &RateLimitDecision, status_code: u16, message: &str) -> Response {
    let status =
        StatusCode::from_u16(status_code).unwrap_or(StatusCode::TOO_MANY_REQUESTS);

    let body = serde_json::json!({
        "error": message,
        "status": status.as_u16(),
        "remaining": decision.remaining.unwrap_or(0),
        "reset_after": decision.reset_secs.unwrap_or(0),
    });

    let mut response = (status, body.to_string()).into_response();
    if let Some(reset) = decision.reset_secs {
        response
            .headers_mut()
            .insert("Retry-After", HeaderValue::from(reset));
    }

    attach_quota_headers(response, decision)
}

/// Attach `X-RateLimit-*` headers when quota information is known.
/// Fail-open decisions carry none and leave the response untouched.
fn attach_quota_headers(mut response: Response, decision: &RateLimitDecision) -> Response {
    if let (Some(limit), Some(remaining), Some(reset)) =
        (decision.limit, decision.remaining, decision.reset_secs)
    {
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(reset));
    }

    response
}

/// Axum middleware function; expects a [`RateLimitMiddleware`] in request
/// extensions and passes requests through untouched when none is present.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(ConnectInfo(addr));

    let limiter = request.extensions().get::<RateLimitMiddleware>().cloned();

    match limiter {
        Some(limiter) => limiter.apply(request, next).await,
        None => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_convention() {
        assert_eq!(
            bucket_key(LimitClass::Auth, "1.2.3.4", "POST", "/login"),
            "auth:1.2.3.4:POST:/login"
        );
        assert_eq!(
            bucket_key(LimitClass::Default, "unknown", "GET", "/events/42"),
            "default:unknown:GET:/events/42"
        );
    }

    #[test]
    fn test_rejection_response_headers_and_status() {
        let decision = RateLimitDecision::denied(5, 30);
        let response = rejection_response(&decision, 429, "Too many requests");

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let headers = response.headers();
        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "5");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "0");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "30");
        assert_eq!(headers.get("Retry-After").unwrap(), "30");
    }

    #[test]
    fn test_rejection_with_invalid_status_falls_back_to_429() {
        let decision = RateLimitDecision::denied(5, 30);
        let response = rejection_response(&decision, 0, "nope");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_quota_headers_attached_on_allow() {
        let decision = RateLimitDecision::allowed(100, 58, 42);
        let response = attach_quota_headers(().into_response(), &decision);

        let headers = response.headers();
        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "100");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "58");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "42");
    }

    #[test]
    fn test_fail_open_decision_adds_no_headers() {
        let decision = RateLimitDecision::fail_open();
        let response = attach_quota_headers(().into_response(), &decision);
        assert!(response.headers().get("X-RateLimit-Limit").is_none());
    }
}
