//! Fixed-window rate limit strategy.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

use super::backend::{CounterStore, KeyTtl};
use super::types::{RateLimitRequest, RateLimitResponse};
use crate::clock::Clock;
use crate::error::Result;

/// Trait for rate limiting algorithms.
#[async_trait]
pub trait RateLimitStrategy: Send + Sync {
    /// Count one request against `req.key` and decide whether it is admitted.
    ///
    /// Store failures are returned as errors, never as an allow or deny.
    async fn check(&self, req: &RateLimitRequest) -> Result<RateLimitResponse>;
}

/// Fixed-window counter over a shared [`CounterStore`].
///
/// Each check reads the count and TTL in one round-trip, refuses without
/// incrementing when the window is already spent, and otherwise increments
/// and compares the new value. Concurrent checks that all read a sub-limit
/// count may push the stored count past the limit, but never admit more
/// than `limit` requests in a window because admission is decided on the
/// post-increment value.
pub struct FixedWindowStrategy {
    store: Arc<dyn CounterStore>,
    clock: Clock,
}

impl FixedWindowStrategy {
    pub fn new(store: Arc<dyn CounterStore>, clock: Clock) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl RateLimitStrategy for FixedWindowStrategy {
    async fn check(&self, req: &RateLimitRequest) -> Result<RateLimitResponse> {
        let snapshot = self.store.read(&req.key).await?;

        trace!(
            key = %req.key,
            count = ?snapshot.count,
            ttl = ?snapshot.ttl,
            "Read counter"
        );

        let now = (self.clock)();
        let window_ttl = snapshot.ttl.remaining().unwrap_or(req.duration);
        let mut expires_at = now + to_chrono(window_ttl);

        // A counter that exists without a TTL would never reset; give it one
        // now. A missing key cannot take an expiry until it is created below.
        if snapshot.ttl == KeyTtl::Persistent {
            debug!(key = %req.key, "Counter has no expiry, starting a new window");
            self.store.set_expiry(&req.key, req.duration).await?;
        }

        let current = snapshot.count.unwrap_or(0);
        if current >= req.limit {
            debug!(
                key = %req.key,
                total = current,
                limit = req.limit,
                "Window already spent"
            );
            return Ok(RateLimitResponse::deny(req.limit, current, expires_at));
        }

        let total = self.store.increment(&req.key).await?;

        // Only the increment that creates the counter returns 1, whatever the
        // read observed; that caller attaches the window's expiry.
        if total == 1 {
            self.store.set_expiry(&req.key, req.duration).await?;
            expires_at = now + to_chrono(req.duration);
        }

        if total > req.limit {
            debug!(
                key = %req.key,
                total = total,
                limit = req.limit,
                "Rate limit exceeded"
            );
            return Ok(RateLimitResponse::deny(req.limit, total, expires_at));
        }

        Ok(RateLimitResponse::allow(req.limit, total, expires_at))
    }
}

fn to_chrono(ttl: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero())
}
