//! Application error type mapping to HTTP status codes and envelope format.

use std::time::Instant;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use relay_types::error::PipelineError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Unknown chat.
    ChatNotFound(String),
    /// Pipeline refused the operation.
    Pipeline(PipelineError),
    /// Generic internal error.
    Internal(String),
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        AppError::Pipeline(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::ChatNotFound(chat_id) => (
                StatusCode::NOT_FOUND,
                "CHAT_NOT_FOUND",
                format!("Chat '{chat_id}' not found"),
            ),
            AppError::Pipeline(PipelineError::ShuttingDown) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                "Relay is shutting down".to_string(),
            ),
            AppError::Pipeline(e) => (StatusCode::SERVICE_UNAVAILABLE, "PIPELINE_ERROR", e.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::warn!(code, %message, "request failed");
        }
        let body: ApiResponse<()> = ApiResponse::error(code, message, Instant::now());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::error::QueueError;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::ChatNotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(PipelineError::ShuttingDown).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(PipelineError::Queue(QueueError::Full))
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes_and_messages() {
        let (_, code, message) = AppError::ChatNotFound("alice".into()).parts();
        assert_eq!(code, "CHAT_NOT_FOUND");
        assert_eq!(message, "Chat 'alice' not found");

        let (_, code, _) = AppError::from(PipelineError::ShuttingDown).parts();
        assert_eq!(code, "SHUTTING_DOWN");
    }
}
