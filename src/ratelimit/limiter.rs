//! HTTP request classifier.
//!
//! Decides which identity a request is counted under and which limit
//! applies, then hands the check to a [`RateLimitStrategy`].

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, Request};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::strategy::RateLimitStrategy;
use super::types::{RateLimitRequest, RateLimitResponse};
use crate::config::RateLimitingConfig;
use crate::error::{Result, WardenError};

/// Default header name for API key authentication.
pub const DEFAULT_API_KEY_HEADER: &str = "API_KEY";

/// Key used when no client address can be resolved.
const UNKNOWN_CLIENT: &str = "unknown";

/// Per-request rate limiter for HTTP traffic.
///
/// Requests carrying a non-empty API key header are counted under the token
/// with the per-token limit. Everything else is counted under the client
/// address with the per-address limit.
pub struct HttpRateLimiter {
    strategy: Arc<dyn RateLimitStrategy>,
    api_key_header: HeaderName,
    ip_max_requests: u64,
    token_max_requests: u64,
    window: Duration,
    trust_proxy: bool,
}

impl HttpRateLimiter {
    /// Build a limiter from configuration.
    pub fn new(strategy: Arc<dyn RateLimitStrategy>, config: &RateLimitingConfig) -> Result<Self> {
        let api_key_header = HeaderName::try_from(config.api_key_header.as_str()).map_err(|e| {
            WardenError::Config(format!(
                "invalid api_key_header '{}': {}",
                config.api_key_header, e
            ))
        })?;

        Ok(Self {
            strategy,
            api_key_header,
            ip_max_requests: config.ip_max_requests,
            token_max_requests: config.token_max_requests,
            window: config.time_window(),
            trust_proxy: config.trust_proxy,
        })
    }

    /// Derive the identity key and limit for a request.
    pub fn classify<B>(&self, req: &Request<B>) -> RateLimitRequest {
        let token = req
            .headers()
            .get(&self.api_key_header)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty());

        match token {
            Some(token) => RateLimitRequest::new(token, self.token_max_requests, self.window),
            None => RateLimitRequest::new(
                self.client_address(req),
                self.ip_max_requests,
                self.window,
            ),
        }
    }

    /// Check the rate limit for an already classified request.
    ///
    /// Kept separate from [`classify`](Self::classify) so callers can drop
    /// the borrow on the request before awaiting the store.
    pub async fn check(&self, limit_req: RateLimitRequest) -> Result<RateLimitResponse> {
        debug!(
            key = %limit_req.key,
            limit = limit_req.limit,
            window_ms = limit_req.duration.as_millis() as u64,
            "Checking rate limit"
        );

        self.strategy.check(&limit_req).await.map_err(|e| {
            error!(
                error = %e,
                key = %limit_req.key,
                limit = limit_req.limit,
                "Failed to check rate limit"
            );
            e
        })
    }

    fn client_address<B>(&self, req: &Request<B>) -> String {
        let forwarded = if self.trust_proxy {
            forwarded_address(req.headers())
        } else {
            None
        };

        forwarded
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

/// Client address from proxy headers.
///
/// `X-Forwarded-For` may hold "client, proxy1, proxy2"; the leftmost entry is
/// the original client.
fn forwarded_address(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use crate::ratelimit::memory::InMemoryCounterStore;
    use crate::ratelimit::strategy::FixedWindowStrategy;
    use axum::body::Body;

    fn config() -> RateLimitingConfig {
        RateLimitingConfig {
            ip_max_requests: 5,
            token_max_requests: 100,
            time_window_ms: 1000,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            trust_proxy: false,
        }
    }

    fn limiter(config: &RateLimitingConfig) -> HttpRateLimiter {
        let store = Arc::new(InMemoryCounterStore::new());
        let strategy = Arc::new(FixedWindowStrategy::new(store, system_clock()));
        HttpRateLimiter::new(strategy, config).unwrap()
    }

    fn request_from(peer: &str) -> Request<Body> {
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn test_api_key_selects_token_limit() {
        let limiter = limiter(&config());
        let mut req = request_from("10.0.0.1:5000");
        req.headers_mut().insert("api_key", "abc123".parse().unwrap());

        let classified = limiter.classify(&req);

        assert_eq!(classified.key, "abc123");
        assert_eq!(classified.limit, 100);
        assert_eq!(classified.duration, Duration::from_millis(1000));
    }

    #[test]
    fn test_token_key_independent_of_address() {
        let limiter = limiter(&config());
        let mut a = request_from("10.0.0.1:5000");
        a.headers_mut().insert("api_key", "abc123".parse().unwrap());
        let mut b = request_from("10.9.9.9:6000");
        b.headers_mut().insert("api_key", "abc123".parse().unwrap());

        assert_eq!(limiter.classify(&a), limiter.classify(&b));
    }

    #[test]
    fn test_missing_api_key_uses_peer_address() {
        let limiter = limiter(&config());
        let req = request_from("192.168.1.7:43210");

        let classified = limiter.classify(&req);

        assert_eq!(classified.key, "192.168.1.7");
        assert_eq!(classified.limit, 5);
    }

    #[test]
    fn test_empty_api_key_falls_back_to_address() {
        let limiter = limiter(&config());
        let mut req = request_from("192.168.1.7:43210");
        req.headers_mut().insert("api_key", "".parse().unwrap());

        let classified = limiter.classify(&req);

        assert_eq!(classified.key, "192.168.1.7");
        assert_eq!(classified.limit, 5);
    }

    #[test]
    fn test_proxy_headers_ignored_unless_trusted() {
        let limiter = limiter(&config());
        let mut req = request_from("10.0.0.1:5000");
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.9".parse().unwrap());

        assert_eq!(limiter.classify(&req).key, "10.0.0.1");
    }

    #[test]
    fn test_trusted_proxy_headers() {
        let mut cfg = config();
        cfg.trust_proxy = true;
        let limiter = limiter(&cfg);

        let mut req = request_from("10.0.0.1:5000");
        req.headers_mut().insert(
            "x-forwarded-for",
            "203.0.113.9, 10.0.0.2, 10.0.0.3".parse().unwrap(),
        );
        assert_eq!(limiter.classify(&req).key, "203.0.113.9");

        let mut req = request_from("10.0.0.1:5000");
        req.headers_mut()
            .insert("x-real-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(limiter.classify(&req).key, "198.51.100.4");
    }

    #[test]
    fn test_unresolvable_address() {
        let limiter = limiter(&config());
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        assert_eq!(limiter.classify(&req).key, UNKNOWN_CLIENT);
    }

    #[test]
    fn test_custom_header_name() {
        let mut cfg = config();
        cfg.api_key_header = "X-Api-Key".to_string();
        let limiter = limiter(&cfg);

        let mut req = request_from("10.0.0.1:5000");
        req.headers_mut().insert("x-api-key", "tok".parse().unwrap());

        assert_eq!(limiter.classify(&req).key, "tok");
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let mut cfg = config();
        cfg.api_key_header = "bad header".to_string();
        let store = Arc::new(InMemoryCounterStore::new());
        let strategy = Arc::new(FixedWindowStrategy::new(store, system_clock()));

        assert!(HttpRateLimiter::new(strategy, &cfg).is_err());
    }

    #[tokio::test]
    async fn test_check_counts_per_identity() {
        let mut cfg = config();
        cfg.ip_max_requests = 1;
        let limiter = limiter(&cfg);

        let check = |peer: &str| limiter.check(limiter.classify(&request_from(peer)));

        let first = check("10.0.0.1:1").await.unwrap();
        let second = check("10.0.0.1:2").await.unwrap();
        let other = check("10.0.0.2:1").await.unwrap();

        assert!(first.is_allowed());
        assert!(!second.is_allowed());
        assert!(other.is_allowed());
    }
}
