//! CompletionBackend trait definition.
//!
//! The pipeline talks to its text-completion service only through this
//! trait. Uses RPITIT (Rust 2024 edition) so implementations can be plain
//! `async fn`s. The HTTP implementation lives in relay-infra; tests use
//! in-memory mocks.

use std::future::Future;

use relay_types::llm::{BackendError, CompletionRequest, CompletionResponse};

/// A service that turns a conversation into a completion.
pub trait CompletionBackend: Send + Sync + 'static {
    /// Human-readable backend name for logs (e.g., "http").
    fn name(&self) -> &str;

    /// Send one non-streaming completion request.
    ///
    /// Implementations must not retry internally; the pipeline owns the
    /// timeout and retry policy.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, BackendError>> + Send;
}
