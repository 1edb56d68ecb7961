//! Completion backend implementations.

pub mod http;

pub use http::HttpCompletionBackend;
