//! Application wiring.
//!
//! Every component is built once here and handed to its consumers
//! explicitly; nothing is stored in globals.

use axum::Router;
use std::sync::Arc;
use tracing::info;

use crate::clock::{system_clock, Clock};
use crate::config::{AppConfig, StoreBackend};
use crate::error::Result;
use crate::http;
use crate::ratelimit::{
    CounterStore, FixedWindowStrategy, HttpRateLimiter, InMemoryCounterStore, RateLimitStrategy,
    RedisCounterStore,
};

/// The initialised components of a running service.
pub struct Dependencies {
    pub config: AppConfig,
    pub store: Arc<dyn CounterStore>,
    pub strategy: Arc<dyn RateLimitStrategy>,
    pub limiter: Arc<HttpRateLimiter>,
    pub router: Router,
}

impl Dependencies {
    /// Open the configured counter store and wire the service around it.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn CounterStore> = match config.store {
            StoreBackend::Redis => Arc::new(RedisCounterStore::connect(&config.redis).await?),
            StoreBackend::Memory => {
                info!("Using in-process counter store; counts are not shared between instances");
                Arc::new(InMemoryCounterStore::new())
            }
        };
        Self::with_store(config, store, system_clock())
    }

    /// Wire the service around an existing counter store and clock.
    pub fn with_store(config: AppConfig, store: Arc<dyn CounterStore>, clock: Clock) -> Result<Self> {
        config.validate()?;

        let strategy: Arc<dyn RateLimitStrategy> =
            Arc::new(FixedWindowStrategy::new(store.clone(), clock));
        let limiter = Arc::new(HttpRateLimiter::new(strategy.clone(), &config.rate_limiting)?);
        let router = http::router(limiter.clone());

        info!(
            ip_max_requests = config.rate_limiting.ip_max_requests,
            token_max_requests = config.rate_limiting.token_max_requests,
            window_ms = config.rate_limiting.time_window_ms,
            api_key_header = %config.rate_limiting.api_key_header,
            "Rate limiter initialized"
        );

        Ok(Self {
            config,
            store,
            strategy,
            limiter,
            router,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::http::{HEADER_RATE_LIMIT_LIMIT, HEADER_RATE_LIMIT_REMAINING};
    use crate::ratelimit::RateLimitRequest;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn get_root(peer: &str) -> Request<Body> {
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn test_with_store_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.rate_limiting.time_window_ms = 0;
        let store = Arc::new(InMemoryCounterStore::new());

        assert!(Dependencies::with_store(config, store, system_clock()).is_err());
    }

    #[tokio::test]
    async fn test_build_with_memory_store_needs_no_redis() {
        let mut config = AppConfig::default();
        config.store = StoreBackend::Memory;
        config.redis.url = "redis://127.0.0.1:1/".to_string();
        config.redis.connect_timeout_ms = 1;
        config.rate_limiting.ip_max_requests = 2;

        let deps = Dependencies::build(config).await.unwrap();

        let response = deps.router.clone().oneshot(get_root("10.0.0.9:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HEADER_RATE_LIMIT_REMAINING], "1");

        let response = deps.router.clone().oneshot(get_root("10.0.0.9:2")).await.unwrap();
        assert_eq!(response.headers()[HEADER_RATE_LIMIT_REMAINING], "0");

        let response = deps.router.oneshot(get_root("10.0.0.9:3")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let clock = clock();
        let a = Dependencies::with_store(
            AppConfig::default(),
            Arc::new(InMemoryCounterStore::with_clock(clock.as_clock())),
            clock.as_clock(),
        )
        .unwrap();
        let b = Dependencies::with_store(
            AppConfig::default(),
            Arc::new(InMemoryCounterStore::with_clock(clock.as_clock())),
            clock.as_clock(),
        )
        .unwrap();

        let req = RateLimitRequest::new("same", 1, std::time::Duration::from_secs(1));
        assert!(a.strategy.check(&req).await.unwrap().is_allowed());
        assert!(b.strategy.check(&req).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_router_serves_hello_behind_limiter() {
        let clock = clock();
        let mut config = AppConfig::default();
        config.rate_limiting.ip_max_requests = 1;
        let deps = Dependencies::with_store(
            config,
            Arc::new(InMemoryCounterStore::with_clock(clock.as_clock())),
            clock.as_clock(),
        )
        .unwrap();

        let response = deps.router.clone().oneshot(get_root("10.0.0.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HEADER_RATE_LIMIT_LIMIT], "1");
        assert_eq!(response.headers()[HEADER_RATE_LIMIT_REMAINING], "0");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], br#"{"message":"Hello World!"}"#);

        let response = deps.router.oneshot(get_root("10.0.0.1:2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
