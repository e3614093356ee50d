//! Error types for the Ratewarden service.

use thiserror::Error;

/// Main error type for Ratewarden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while layering configuration sources
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// Counter store failures not tied to a specific backend
    #[error("Counter store error: {0}")]
    Store(String),

    /// Redis communication errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratewarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
