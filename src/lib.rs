//! Ratewarden - Fixed-Window HTTP Admission Control
//!
//! This crate decides, per incoming HTTP request, whether to admit or reject
//! it based on a per-identity counter in a shared store. Identities are API
//! tokens when presented, otherwise client addresses. Counts live in Redis so
//! every replica behind a load balancer enforces the same window.

pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
