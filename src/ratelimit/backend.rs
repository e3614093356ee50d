//! Counter store trait for abstracting the shared and in-process backends.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Time-to-live state of a counter key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist
    Missing,
    /// The key exists but never expires
    Persistent,
    /// The key expires after this long
    Expires(Duration),
}

impl KeyTtl {
    /// The remaining lifetime, if the key has one.
    ///
    /// A zero TTL is a key in its last millisecond; its window ends now.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            KeyTtl::Expires(ttl) => Some(*ttl),
            _ => None,
        }
    }
}

/// Count and TTL of a key observed in one round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Current count, `None` if the key was not found
    pub count: Option<u64>,
    pub ttl: KeyTtl,
}

impl CounterSnapshot {
    pub fn missing() -> Self {
        Self {
            count: None,
            ttl: KeyTtl::Missing,
        }
    }
}

/// Integer counters with expiry, shared by every process enforcing a quota.
///
/// Implementations own no policy. Every failure is returned to the caller.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the count and remaining TTL of `key`.
    async fn read(&self, key: &str) -> Result<CounterSnapshot>;

    /// Expire `key` after `ttl`.
    ///
    /// Returns `false` without creating anything when the key does not exist.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Atomically add one to `key` and return the new value.
    ///
    /// A missing key is created at 1 with no expiry.
    async fn increment(&self, key: &str) -> Result<u64>;
}
