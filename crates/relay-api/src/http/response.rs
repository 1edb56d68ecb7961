//! Envelope response format for all API responses.
//!
//! Every response is wrapped in a consistent envelope:
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 0 },
//!   "errors": []
//! }
//! ```

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Envelope wrapping all API data.
///
/// Deserialize is derived so `relayd status` can read the same envelope it
/// serves.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    pub meta: ApiMeta,

    /// Error list (empty on success).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,
}

/// Metadata included in every response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiMeta {
    /// Unique request identifier (UUIDv7).
    pub request_id: String,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
    pub response_time_ms: u64,
}

impl ApiMeta {
    /// Metadata for a request that started at `started`.
    pub fn since(started: Instant) -> Self {
        Self {
            request_id: uuid::Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Individual error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, started: Instant) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::since(started),
            errors: Vec::new(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>, started: Instant) -> Self {
        Self {
            data: None,
            meta: ApiMeta::since(started),
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message: message.into(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_omits_errors() {
        let resp = ApiResponse::success(serde_json::json!({"ok": true}), Instant::now());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["data"]["ok"], true);
        assert!(json.get("errors").is_none());
        assert!(!json["meta"]["request_id"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_error_envelope_round_trips() {
        let resp: ApiResponse<()> = ApiResponse::error("NOT_FOUND", "missing", Instant::now());
        let text = serde_json::to_string(&resp).unwrap();
        assert!(!text.contains("\"data\""));

        let parsed: ApiResponse<serde_json::Value> = serde_json::from_str(&text).unwrap();
        assert!(parsed.data.is_none());
        assert_eq!(parsed.errors[0].code, "NOT_FOUND");
    }
}
