//! HTTP API for the relay.
//!
//! Axum-based read-only API at `/api/v1/` with an envelope response format
//! and CORS support. Messages enter through the console transport, not
//! through HTTP.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
