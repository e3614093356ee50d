//! Admission middleware.
//!
//! Every request is checked exactly once. Quota headers are set on every
//! successful check, including denials; a failed check yields a 500 and the
//! inner service is never called.

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, error};

use crate::ratelimit::{HttpRateLimiter, RateLimitResponse, RateLimitResult};

pub const HEADER_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// JSON error body for rejected or failed requests.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    fn rate_limited() -> Self {
        Self {
            error: "rate_limit_exceeded".to_string(),
            message: "rate limit exceeded".to_string(),
        }
    }

    fn check_failed(cause: impl std::fmt::Display) -> Self {
        Self {
            error: "rate_limit_check_failed".to_string(),
            message: format!("failed to check rate limit: {}", cause),
        }
    }
}

fn apply_quota_headers(response: &mut Response, outcome: &RateLimitResponse) {
    let headers = response.headers_mut();
    headers.insert(HEADER_RATE_LIMIT_LIMIT, HeaderValue::from(outcome.limit));
    headers.insert(HEADER_RATE_LIMIT_REMAINING, HeaderValue::from(outcome.remaining));
    headers.insert(
        HEADER_RATE_LIMIT_RESET,
        HeaderValue::from(outcome.expires_at.timestamp()),
    );
}

/// Tower layer that puts [`AdmissionService`] in front of a handler chain.
#[derive(Clone)]
pub struct AdmissionLayer {
    limiter: Arc<HttpRateLimiter>,
}

impl AdmissionLayer {
    pub fn new(limiter: Arc<HttpRateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Tower service enforcing the rate limit before calling `inner`.
#[derive(Clone)]
pub struct AdmissionService<S> {
    inner: S,
    limiter: Arc<HttpRateLimiter>,
}

impl<S> Service<Request> for AdmissionService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // The clone has not been polled ready; keep the ready one for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limiter = self.limiter.clone();
        let limit_req = limiter.classify(&req);

        Box::pin(async move {
            let outcome = match limiter.check(limit_req).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Failed to check rate limit");
                    let body = ErrorBody::check_failed(&e);
                    return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response());
                }
            };

            debug!(
                limit = outcome.limit,
                remaining = outcome.remaining,
                expires_at = %outcome.expires_at,
                "Rate limit check result"
            );

            let mut response = match outcome.result {
                RateLimitResult::Deny => {
                    (StatusCode::TOO_MANY_REQUESTS, Json(ErrorBody::rate_limited())).into_response()
                }
                RateLimitResult::Allow => inner.call(req).await?.into_response(),
            };

            apply_quota_headers(&mut response, &outcome);
            Ok(response)
        })
    }
}
