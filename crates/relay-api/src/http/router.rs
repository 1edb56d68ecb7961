//! Axum router configuration with middleware.
//!
//! API routes are under `/api/v1/`; `/health` sits at the root.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/stats", get(handlers::stats::get_stats))
        .route("/chats/{chat_id}", get(handlers::chat::get_chat));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness probe.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use relay_core::pipeline::Admission;
    use relay_infra::backend::HttpCompletionBackend;
    use relay_types::config::RelayConfig;
    use relay_types::message::InboundMessage;

    use crate::http::handlers::stats::StatsBody;
    use crate::http::response::ApiResponse;

    /// State whose backend points at a closed port. None of these tests
    /// reach the backend.
    fn test_state() -> AppState {
        let backend =
            HttpCompletionBackend::new("http://127.0.0.1:9/v1/chat/completions", None).unwrap();
        AppState::with_backend(RelayConfig::default(), backend, PathBuf::from("relay.toml"))
    }

    async fn serve(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_health() {
        let base = serve(test_state()).await;
        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_stats_reflects_pipeline_counters() {
        let state = test_state();

        // Default burst is 1: the second message from the same sender is refused.
        let first = state
            .pipeline
            .handle_inbound(InboundMessage::text("c1", "alice", "hello"))
            .await
            .unwrap();
        let second = state
            .pipeline
            .handle_inbound(InboundMessage::text("c1", "alice", "again"))
            .await
            .unwrap();
        assert_eq!(first, Admission::Queued);
        assert_eq!(second, Admission::RateLimited);

        let base = serve(state.clone()).await;
        let resp = reqwest::get(format!("{base}/api/v1/stats")).await.unwrap();
        assert!(resp.status().is_success());

        let envelope: ApiResponse<StatsBody> = resp.json().await.unwrap();
        let stats = envelope.data.unwrap();
        assert_eq!(stats.model, "local-model");
        assert_eq!(stats.status.metrics.total_requests, 1);
        assert_eq!(stats.status.metrics.rate_limited, 1);
        assert_eq!(stats.status.metrics.cache_misses, 1);
        assert_eq!(stats.status.active_chats, 1);
        assert_eq!(stats.status.worker_capacity, 10);
        assert!(envelope.errors.is_empty());
    }

    #[tokio::test]
    async fn test_chat_lookup() {
        let state = test_state();
        state
            .pipeline
            .handle_inbound(InboundMessage::text("known", "bob", "hi"))
            .await
            .unwrap();
        let base = serve(state).await;

        let resp = reqwest::get(format!("{base}/api/v1/chats/known")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let envelope: ApiResponse<serde_json::Value> = resp.json().await.unwrap();
        assert_eq!(envelope.data.unwrap()["chat_id"], "known");

        let resp = reqwest::get(format!("{base}/api/v1/chats/missing")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        let envelope: ApiResponse<serde_json::Value> = resp.json().await.unwrap();
        assert_eq!(envelope.errors[0].code, "CHAT_NOT_FOUND");
    }
}
