//! Pipeline counters.
//!
//! `RelayMetrics` is constructed by the caller and shared with the pipeline
//! through an `Arc`, so the same instance can be read by status surfaces
//! while the pipeline updates it.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use relay_types::metrics::MetricsSnapshot;

/// Backend calls slower than this count as slow responses.
pub const SLOW_RESPONSE_THRESHOLD: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct LatencyStats {
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct RelayMetrics {
    total_requests: AtomicU64,
    rate_limited: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    failed_requests: AtomicU64,
    slow_responses: AtomicU64,
    backend_requests: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
    batches_processed: AtomicU64,
    summaries_completed: AtomicU64,
    summaries_failed: AtomicU64,
    generated_tokens: AtomicU64,
    latency: Mutex<LatencyStats>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// One attempt sent to the backend (retries count separately).
    pub fn record_backend_call(&self) {
        self.backend_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// One backend attempt that hit its deadline.
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_summary(&self, succeeded: bool) {
        if succeeded {
            self.summaries_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.summaries_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a successful backend response.
    pub fn record_response(&self, latency: Duration, tokens: u32) {
        self.generated_tokens
            .fetch_add(u64::from(tokens), Ordering::Relaxed);
        if latency > SLOW_RESPONSE_THRESHOLD {
            self.slow_responses.fetch_add(1, Ordering::Relaxed);
        }

        let mut stats = self.latency.lock().expect("latency stats lock poisoned");
        stats.count += 1;
        stats.total += latency;
        stats.min = Some(stats.min.map_or(latency, |min| min.min(latency)));
        stats.max = Some(stats.max.map_or(latency, |max| max.max(latency)));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stats = self.latency.lock().expect("latency stats lock poisoned");
        let avg = (stats.count > 0).then(|| stats.total / stats.count as u32);

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            slow_responses: self.slow_responses.load(Ordering::Relaxed),
            backend_requests: self.backend_requests.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            batches_processed: self.batches_processed.load(Ordering::Relaxed),
            summaries_completed: self.summaries_completed.load(Ordering::Relaxed),
            summaries_failed: self.summaries_failed.load(Ordering::Relaxed),
            generated_tokens: self.generated_tokens.load(Ordering::Relaxed),
            min_latency_ms: stats.min.map(|d| d.as_millis() as u64),
            avg_latency_ms: avg.map(|d| d.as_millis() as u64),
            max_latency_ms: stats.max.map(|d| d.as_millis() as u64),
        }
    }
}
