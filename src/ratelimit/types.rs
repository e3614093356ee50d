//! Request and outcome types for a single rate limit check.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// The request is within quota
    Allow,
    /// The quota for the current window is spent
    Deny,
}

/// Parameters for one rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRequest {
    /// Identity the count is bucketed under (API token or client address)
    pub key: String,
    /// Maximum admitted requests per window
    pub limit: u64,
    /// Window length
    pub duration: Duration,
}

impl RateLimitRequest {
    pub fn new(key: impl Into<String>, limit: u64, duration: Duration) -> Self {
        Self {
            key: key.into(),
            limit,
            duration,
        }
    }
}

/// Result of a rate limit check with quota bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResponse {
    pub result: RateLimitResult,
    /// The limit that was applied
    pub limit: u64,
    /// Count for the window after this check
    pub total: u64,
    /// Requests left in the window; always 0 on deny
    pub remaining: u64,
    /// When the current window ends
    pub expires_at: DateTime<Utc>,
}

impl RateLimitResponse {
    pub(crate) fn allow(limit: u64, total: u64, expires_at: DateTime<Utc>) -> Self {
        Self {
            result: RateLimitResult::Allow,
            limit,
            total,
            remaining: limit.saturating_sub(total),
            expires_at,
        }
    }

    pub(crate) fn deny(limit: u64, total: u64, expires_at: DateTime<Utc>) -> Self {
        Self {
            result: RateLimitResult::Deny,
            limit,
            total,
            remaining: 0,
            expires_at,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.result == RateLimitResult::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_remaining_complements_total() {
        let response = RateLimitResponse::allow(5, 3, Utc::now());

        assert!(response.is_allowed());
        assert_eq!(response.remaining + response.total, response.limit);
    }

    #[test]
    fn test_deny_has_no_remaining() {
        let response = RateLimitResponse::deny(5, 7, Utc::now());

        assert!(!response.is_allowed());
        assert_eq!(response.remaining, 0);
        assert_eq!(response.total, 7);
    }
}
