//! Metrics and status snapshots exposed to readers (CLI, HTTP stats endpoint).

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;

/// Counters and latency figures accumulated by the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Inbound messages admitted past the rate limiter.
    pub total_requests: u64,
    pub rate_limited: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Requests that ended with a failure notice to the sender.
    pub failed_requests: u64,
    /// Backend calls slower than the slow-response threshold.
    pub slow_responses: u64,
    pub backend_requests: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub batches_processed: u64,
    pub summaries_completed: u64,
    pub summaries_failed: u64,
    /// Total words generated by the backend.
    pub generated_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
}

impl MetricsSnapshot {
    /// Fraction of cache lookups that hit, or 0 when there were none.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Adaptive timeout state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothed_latency_ms: Option<u64>,
    pub timeout_count: u64,
    pub current_timeout_ms: u64,
}

/// Everything a status reader sees about a running pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub metrics: MetricsSnapshot,
    pub cache: CacheStats,
    pub timeout: TimeoutSnapshot,
    pub active_chats: usize,
    pub tracked_senders: usize,
    /// Batches currently executing on the worker pool.
    pub in_flight_batches: usize,
    pub worker_capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_rate() {
        let mut snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.cache_hit_rate(), 0.0);
        snapshot.cache_hits = 3;
        snapshot.cache_misses = 1;
        assert!((snapshot.cache_hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_json_roundtrip_keeps_latency() {
        let status = PipelineStatus {
            metrics: MetricsSnapshot {
                total_requests: 7,
                min_latency_ms: Some(120),
                ..Default::default()
            },
            worker_capacity: 10,
            ..Default::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("max_latency_ms"));
        let parsed: PipelineStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.metrics.total_requests, 7);
        assert_eq!(parsed.metrics.min_latency_ms, Some(120));
        assert_eq!(parsed.worker_capacity, 10);
    }
}
