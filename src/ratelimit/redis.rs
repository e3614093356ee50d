//! Redis-backed counter store.
//!
//! Counts live as plain integer strings so every replica sharing the Redis
//! instance sees the same window. `INCR` is the only ordering guarantee.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{CounterSnapshot, CounterStore, KeyTtl};
use crate::config::RedisConfig;
use crate::error::{Result, WardenError};

/// `PTTL` reply for a key that does not exist.
const PTTL_KEY_NOT_FOUND: i64 = -2;
/// `PTTL` reply for a key without an expiry.
const PTTL_NO_EXPIRY: i64 = -1;

/// Counter store talking to Redis over a multiplexed, auto-reconnecting
/// connection.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect to the Redis instance described by `config`.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;

        let conn = tokio::time::timeout(config.connect_timeout(), ConnectionManager::new(client))
            .await
            .map_err(|_| {
                WardenError::Store(format!(
                    "timed out after {}ms connecting to Redis",
                    config.connect_timeout_ms
                ))
            })??;

        info!("Connected to Redis counter store");
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn ttl_from_pttl(pttl: i64) -> KeyTtl {
    match pttl {
        PTTL_KEY_NOT_FOUND => KeyTtl::Missing,
        PTTL_NO_EXPIRY => KeyTtl::Persistent,
        ms if ms >= 0 => KeyTtl::Expires(Duration::from_millis(ms as u64)),
        _ => KeyTtl::Missing,
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn read(&self, key: &str) -> Result<CounterSnapshot> {
        let mut conn = self.conn.clone();

        let (count, pttl) = redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async::<(Option<u64>, i64)>(&mut conn)
            .await?;

        Ok(CounterSnapshot {
            count,
            ttl: ttl_from_pttl(pttl),
        })
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let applied = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis)
            .query_async::<i64>(&mut conn)
            .await?;

        debug!(key = %key, ttl_ms = millis, applied = applied == 1, "Set counter expiry");
        Ok(applied == 1)
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();

        let count = redis::cmd("INCR")
            .arg(key)
            .query_async::<u64>(&mut conn)
            .await?;

        Ok(count)
    }
}
