//! Configuration management for Ratewarden.

use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, WardenError};

/// Prefix for environment variable overrides, e.g.
/// `RATEWARDEN_RATE_LIMITING__IP_MAX_REQUESTS=20`.
pub const ENV_PREFIX: &str = "RATEWARDEN";

/// Main configuration for the Ratewarden service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Which counter store backs the rate limiter
    #[serde(default)]
    pub store: StoreBackend,

    /// Counter store connection
    #[serde(default)]
    pub redis: RedisConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Counter store backend.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis instance; counts are consistent across replicas
    #[default]
    Redis,
    /// Process-local counters for single-instance deployments
    Memory,
}

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/`
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// How long to wait for the initial connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl RedisConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per window for callers identified by address
    #[serde(default = "default_ip_max_requests")]
    pub ip_max_requests: u64,

    /// Requests admitted per window for callers presenting an API key
    #[serde(default = "default_token_max_requests")]
    pub token_max_requests: u64,

    /// Window length in milliseconds
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: u64,

    /// Header carrying the API key
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Trust `X-Forwarded-For` / `X-Real-IP` when resolving the client address.
    ///
    /// Only enable behind a proxy that overwrites these headers, otherwise
    /// callers can pick their own identity key.
    #[serde(default)]
    pub trust_proxy: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            ip_max_requests: default_ip_max_requests(),
            token_max_requests: default_token_max_requests(),
            time_window_ms: default_time_window_ms(),
            api_key_header: default_api_key_header(),
            trust_proxy: false,
        }
    }
}

impl RateLimitingConfig {
    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }
}

fn default_ip_max_requests() -> u64 {
    10
}

fn default_token_max_requests() -> u64 {
    100
}

fn default_time_window_ms() -> u64 {
    1000
}

fn default_api_key_header() -> String {
    "API_KEY".to_string()
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from an optional file layered under
    /// `RATEWARDEN_*` environment variables.
    ///
    /// Nested keys use `__` as separator, so
    /// `RATEWARDEN_RATE_LIMITING__TIME_WINDOW_MS` sets
    /// `rate_limiting.time_window_ms`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(Path::new(path)).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the rate limiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;

        if rl.ip_max_requests == 0 {
            return Err(WardenError::Config(
                "rate_limiting.ip_max_requests must be positive".to_string(),
            ));
        }
        if rl.token_max_requests == 0 {
            return Err(WardenError::Config(
                "rate_limiting.token_max_requests must be positive".to_string(),
            ));
        }
        if rl.time_window_ms == 0 {
            return Err(WardenError::Config(
                "rate_limiting.time_window_ms must be positive".to_string(),
            ));
        }
        if rl.api_key_header.is_empty() || HeaderName::try_from(rl.api_key_header.as_str()).is_err()
        {
            return Err(WardenError::Config(format!(
                "rate_limiting.api_key_header '{}' is not a valid header name",
                rl.api_key_header
            )));
        }
        if self.store == StoreBackend::Redis && self.redis.url.trim().is_empty() {
            return Err(WardenError::Config("redis.url must not be empty".to_string()));
        }

        Ok(())
    }
}
