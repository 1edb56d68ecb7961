//! Per-sender token bucket rate limiting.
//!
//! `RateLimiter` is the first gate every inbound message passes. Each sender
//! gets a bucket of `burst` tokens refilled at `rate` tokens per second,
//! created lazily and full. Buckets that sat idle long enough to refill
//! completely are indistinguishable from fresh ones, so a periodic sweep
//! drops them to keep the map bounded by the set of recently active senders.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use relay_types::config::RateLimitConfig;

/// Token bucket state for a single sender.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        }
    }

    /// Tokens the bucket would hold at `now`, without mutating it.
    fn available_at(&self, rate: f64, burst: f64, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * rate).min(burst)
    }

    fn refill(&mut self, rate: f64, burst: f64, now: Instant) {
        self.tokens = self.available_at(rate, burst, now);
        self.last_refill = now;
    }
}

/// Per-sender token bucket limiter.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    /// Create a limiter refilling `rate` tokens per second up to `burst`.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: f64::from(burst.max(1)),
            buckets: DashMap::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.rate_per_sec, config.burst)
    }

    /// Take one token from the sender's bucket.
    ///
    /// Returns `false` when the bucket is empty; the caller is responsible
    /// for telling the sender.
    pub fn allow(&self, sender_id: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .buckets
            .entry(sender_id.to_string())
            .or_insert_with(|| TokenBucket::full(self.burst, now));

        let bucket = entry.value_mut();
        bucket.refill(self.rate, self.burst, now);
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for at least `idle_ttl` that have refilled to full.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep_idle(&self, idle_ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let idle = now.saturating_duration_since(bucket.last_seen) >= idle_ttl;
            let full = bucket.available_at(self.rate, self.burst, now) >= self.burst;
            !(idle && full)
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Run `sweep_idle` every `interval` until cancelled.
    pub async fn run_sweeper(
        &self,
        idle_ttl: Duration,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = self.sweep_idle(idle_ttl);
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "swept idle rate-limit buckets");
                    }
                }
            }
        }
    }

    /// Number of senders currently tracked.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("tracked_senders", &self.buckets.len())
            .finish()
    }
}
