//! In-process counter store.
//!
//! Mirrors the Redis semantics the fixed-window strategy depends on: a
//! missing key reads as not found, expiring a missing key is a no-op, and
//! incrementing a missing key creates it at 1 without a TTL. Expiry is
//! evaluated lazily against the injected clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;

use super::backend::{CounterSnapshot, CounterStore, KeyTtl};
use crate::clock::{system_clock, Clock};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Option<DateTime<Utc>>,
}

impl Counter {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// A counter store held in this process only.
///
/// Suitable for tests and single-instance deployments; replicas behind a
/// load balancer each get their own counts.
pub struct InMemoryCounterStore {
    counters: DashMap<String, Counter>,
    clock: Clock,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a store that evaluates expiry against `clock`.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = (self.clock)();
        self.counters
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all counters.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.counters.clear();
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn read(&self, key: &str) -> Result<CounterSnapshot> {
        let now = (self.clock)();

        // Drop an expired counter so it reads as missing.
        self.counters.remove_if(key, |_, counter| counter.is_expired(now));

        let snapshot = match self.counters.get(key) {
            None => CounterSnapshot::missing(),
            Some(counter) => {
                let ttl = match counter.expires_at {
                    None => KeyTtl::Persistent,
                    Some(at) => KeyTtl::Expires((at - now).to_std().unwrap_or(Duration::ZERO)),
                };
                CounterSnapshot {
                    count: Some(counter.count),
                    ttl,
                }
            }
        };

        Ok(snapshot)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = (self.clock)();

        match self.counters.get_mut(key) {
            Some(mut counter) if !counter.is_expired(now) => {
                counter.expires_at = chrono::Duration::from_std(ttl)
                    .ok()
                    .and_then(|ttl| now.checked_add_signed(ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        let now = (self.clock)();

        let count = match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                if counter.is_expired(now) {
                    *counter = Counter {
                        count: 1,
                        expires_at: None,
                    };
                } else {
                    counter.count = counter.count.saturating_add(1);
                }
                counter.count
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Counter {
                    count: 1,
                    expires_at: None,
                });
                1
            }
        };

        Ok(count)
    }
}
