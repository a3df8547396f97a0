//! Rate limiting middleware over a shared counter store.
//!
//! Implements per-client fixed-window limiting: each request increments the
//! caller's counter, which expires one window after its first hit.

use std::{fmt, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use mediator_repo::security::hash_api_key;
use mediator_types::CounterStore;

use super::auth::{extract_api_key, is_health};
use super::extract::{AuthenticatedUser, client_ip};

/// What to do with a request when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Let the request through.
    Open,
    /// Reject it with 503.
    #[default]
    Closed,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!(
                "Invalid failure policy '{}': expected 'open' or 'closed'",
                other
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

/// Rate limiter state shared across requests.
#[derive(Clone)]
pub struct RateLimiterState {
    store: Arc<dyn CounterStore>,
    /// Requests allowed per window
    limit: u64,
    window: Duration,
    policy: FailurePolicy,
}

impl RateLimiterState {
    pub const DEFAULT_LIMIT: u64 = 100;
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

    /// Creates a new rate limiter state.
    ///
    /// # Arguments
    /// * `store` - Shared counters
    /// * `limit` - Number of requests allowed per window
    /// * `window` - Window length, also the counter TTL
    /// * `policy` - Behaviour when `store` fails
    pub fn new(
        store: Arc<dyn CounterStore>,
        limit: u64,
        window: Duration,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            limit,
            window,
            policy,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Counter key for the request: the hashed API key once the auth middleware
/// has verified it, otherwise the client IP. Unverified tokens never get a
/// bucket of their own, so rotating junk keys cannot dodge the limit.
fn identity(request: &Request<Body>) -> String {
    let verified = request.extensions().get::<AuthenticatedUser>().is_some();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    identity_for(request.headers(), peer, verified)
}

fn identity_for(headers: &HeaderMap, peer: Option<SocketAddr>, verified: bool) -> String {
    let auth_header = headers.get("Authorization").and_then(|h| h.to_str().ok());
    if let Some(key) = extract_api_key(auth_header).filter(|_| verified) {
        return format!("key:{}", hash_api_key(key));
    }

    match client_ip(headers, peer) {
        Some(ip) => format!("ip:{}", ip),
        None => "unknown".to_string(),
    }
}

fn rejected(limiter: &RateLimiterState, resets_in: Duration) -> Response {
    // Round up so clients never retry inside the current window.
    let retry_after = resets_in.as_secs() + u64::from(resets_in.subsec_nanos() > 0);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Rate limit exceeded",
            "limit": limiter.limit,
            "window": limiter.window.as_secs(),
            "retry_after_seconds": retry_after
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_health(request.uri().path()) {
        return next.run(request).await;
    }

    let key = identity(&request);
    match limiter.store.increment(&key, limiter.window).await {
        Ok(hit) if hit.count > limiter.limit => {
            tracing::warn!(identity = %key, count = hit.count, "Rate limit exceeded");
            rejected(&limiter, hit.resets_in)
        }
        Ok(_) => next.run(request).await,
        Err(e) => match limiter.policy {
            FailurePolicy::Open => {
                tracing::warn!("Rate limiter store unavailable, allowing request: {}", e);
                next.run(request).await
            }
            FailurePolicy::Closed => {
                tracing::error!("Rate limiter store unavailable, rejecting request: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "error": "Rate limiter unavailable",
                        "code": 503
                    })),
                )
                    .into_response()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("open".parse::<FailurePolicy>(), Ok(FailurePolicy::Open));
        assert_eq!(" Closed ".parse::<FailurePolicy>(), Ok(FailurePolicy::Closed));
        assert!("maybe".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::default(), FailurePolicy::Closed);
    }

    #[test]
    fn test_identity_uses_verified_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer mk_abc"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(
            identity_for(&headers, None, true),
            format!("key:{}", hash_api_key("mk_abc"))
        );
    }

    #[test]
    fn test_identity_ignores_unverified_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer junk"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(identity_for(&headers, None, false), "ip:203.0.113.7");
    }

    #[test]
    fn test_identity_falls_back_to_ip() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        assert_eq!(identity(&request), "ip:203.0.113.7");

        let peer: SocketAddr = "198.51.100.4:5000".parse().unwrap();
        assert_eq!(
            identity_for(&HeaderMap::new(), Some(peer), false),
            "ip:198.51.100.4"
        );

        let anonymous = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(identity(&anonymous), "unknown");
    }
}
