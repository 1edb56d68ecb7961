//! Relay configuration types.
//!
//! `RelayConfig` represents the top-level `relay.toml`. Every section and
//! every field has a default, so an empty file (or no file at all) yields
//! a working configuration pointed at a local completion server.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration for the relay.
///
/// Loaded from `~/.relay/relay.toml` (or `$RELAY_DATA_DIR/relay.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl RelayConfig {
    /// Reject values the pipeline cannot run with. Timer periods must be
    /// non-zero, as must the sizes that bound batching and concurrency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("queue.batch_window_ms", self.queue.batch_window_ms),
            ("queue.batch_size", self.queue.batch_size as u64),
            ("queue.workers", self.queue.workers as u64),
            ("queue.intake_capacity", self.queue.intake_capacity as u64),
            ("cache.capacity", self.cache.capacity as u64),
            ("cache.cleanup_interval_secs", self.cache.cleanup_interval_secs),
            ("rate_limit.sweep_interval_secs", self.rate_limit.sweep_interval_secs),
            ("conversation.max_history", self.conversation.max_history as u64),
        ];
        if let Some(&(field, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid {
                field,
                reason: "must be greater than zero".to_string(),
            });
        }

        let rate = self.rate_limit.rate_per_sec;
        if rate.is_nan() || rate <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit.rate_per_sec",
                reason: format!("must be positive, got {rate}"),
            });
        }
        if self.timeout.min_secs > self.timeout.max_secs {
            return Err(ConfigError::Invalid {
                field: "timeout.min_secs",
                reason: format!(
                    "{} exceeds timeout.max_secs ({})",
                    self.timeout.min_secs, self.timeout.max_secs
                ),
            });
        }
        Ok(())
    }
}

/// Completion backend endpoint. The API key is never stored here; it is
/// read from `RELAY_BACKEND_API_KEY` at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_backend_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_backend_url() -> String {
    "http://localhost:1234/v1/chat/completions".to_string()
}

fn default_backend_model() -> String {
    "local-model".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            model: default_backend_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Per-sender token bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Steady refill rate in tokens per second.
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,
    /// Bucket capacity.
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Full buckets untouched for this long are dropped by the sweep.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_limiter_sweep_secs")]
    pub sweep_interval_secs: u64,
}

fn default_rate_per_sec() -> f64 {
    0.5
}

fn default_burst() -> u32 {
    1
}

fn default_idle_ttl_secs() -> u64 {
    600
}

fn default_limiter_sweep_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: default_rate_per_sec(),
            burst: default_burst(),
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_limiter_sweep_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Response cache sizing and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_cleanup_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_cache_cleanup_secs() -> u64 {
    5 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
            cleanup_interval_secs: default_cache_cleanup_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// Batching queue and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of batches executing at once.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// A batch is flushed as soon as it holds this many messages.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Open batches are flushed on every tick of this window.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
    /// Buffered intake slots; `enqueue` fails rather than blocks when full.
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
}

fn default_workers() -> usize {
    10
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_window_ms() -> u64 {
    5_000
}

fn default_intake_capacity() -> usize {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            batch_window_ms: default_batch_window_ms(),
            intake_capacity: default_intake_capacity(),
        }
    }
}

impl QueueConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms.max(1))
    }
}

/// Adaptive timeout and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout used before any latency sample exists.
    #[serde(default = "default_initial_secs")]
    pub initial_secs: u64,
    #[serde(default = "default_min_secs")]
    pub min_secs: u64,
    #[serde(default = "default_max_secs")]
    pub max_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Overall deadline for one background summarization.
    #[serde(default = "default_summary_deadline_secs")]
    pub summary_deadline_secs: u64,
}

fn default_initial_secs() -> u64 {
    15
}

fn default_min_secs() -> u64 {
    10
}

fn default_max_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_summary_deadline_secs() -> u64 {
    300
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            initial_secs: default_initial_secs(),
            min_secs: default_min_secs(),
            max_secs: default_max_secs(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            summary_deadline_secs: default_summary_deadline_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_secs(self.initial_secs)
    }

    pub fn min(&self) -> Duration {
        Duration::from_secs(self.min_secs)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }

    pub fn summary_deadline(&self) -> Duration {
        Duration::from_secs(self.summary_deadline_secs)
    }
}

/// Per-chat history bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Summarization is scheduled once history grows past this length.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Raw turns kept after a successful summarization.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// Oldest turns are dropped past this length. Defaults to 4 x `max_history`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_limit: Option<usize>,
}

fn default_max_history() -> usize {
    10
}

fn default_keep_recent() -> usize {
    2
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            keep_recent: default_keep_recent(),
            hard_limit: None,
        }
    }
}

impl ConversationConfig {
    pub fn effective_hard_limit(&self) -> usize {
        self.hard_limit.unwrap_or(self.max_history * 4)
    }
}

/// HTTP status server bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
