//! Rate limiting logic and counter storage.

mod backend;
mod limiter;
mod memory;
mod redis;
mod strategy;
mod types;

pub use backend::{CounterSnapshot, CounterStore, KeyTtl};
pub use limiter::{HttpRateLimiter, DEFAULT_API_KEY_HEADER};
pub use memory::InMemoryCounterStore;
pub use self::redis::RedisCounterStore;
pub use strategy::{FixedWindowStrategy, RateLimitStrategy};
pub use types::{RateLimitRequest, RateLimitResponse, RateLimitResult};
