//! Conversation inspection endpoint.
//!
//! GET /api/v1/chats/{chat_id} - History and rolling summary of one chat.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};

use relay_types::chat::ConversationSnapshot;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<ConversationSnapshot>>, AppError> {
    let start = Instant::now();

    let snapshot = state
        .pipeline
        .conversations()
        .snapshot(&chat_id)
        .ok_or(AppError::ChatNotFound(chat_id))?;

    Ok(Json(ApiResponse::success(snapshot, start)))
}
