//! HTTP surface: admission middleware, handlers and server.

mod handlers;
mod middleware;
mod server;

pub use handlers::hello;
pub use middleware::{
    AdmissionLayer, AdmissionService, ErrorBody, HEADER_RATE_LIMIT_LIMIT,
    HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_RESET,
};
pub use server::HttpServer;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::ratelimit::HttpRateLimiter;

/// Build the router with every route behind the admission middleware.
pub fn router(limiter: Arc<HttpRateLimiter>) -> Router {
    Router::new()
        .route("/", get(hello))
        .layer(AdmissionLayer::new(limiter))
}
