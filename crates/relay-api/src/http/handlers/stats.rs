//! Pipeline statistics endpoint.
//!
//! GET /api/v1/stats - Live counters, cache and timeout state.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use relay_types::metrics::PipelineStatus;

use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Payload of `GET /api/v1/stats`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsBody {
    pub version: String,
    pub uptime_secs: u64,
    pub backend_url: String,
    pub model: String,
    pub status: PipelineStatus,
}

pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<StatsBody>> {
    let start = Instant::now();

    let body = StatsBody {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        backend_url: state.config.backend.url.clone(),
        model: state.config.backend.model.clone(),
        status: state.pipeline.status(),
    };

    Json(ApiResponse::success(body, start))
}
