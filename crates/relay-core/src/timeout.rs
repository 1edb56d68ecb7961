//! Adaptive timeout and bounded retry for backend calls.
//!
//! `AdaptiveTimeout` keeps an exponentially weighted moving average of
//! successful backend latencies and derives the timeout of the next call
//! from it: twice the average, clamped to `[min, max]`. Before the first
//! sample it uses the configured initial timeout. `call_with_retry` wraps
//! a backend operation with that timeout and retries transient failures
//! with a growing timeout.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use relay_types::config::TimeoutConfig;
use relay_types::llm::BackendError;
use relay_types::metrics::TimeoutSnapshot;

use crate::metrics::RelayMetrics;

/// Weight of the previous average, in tenths.
const EWMA_KEEP_TENTHS: u128 = 7;
/// Weight of the new sample, in tenths.
const EWMA_SAMPLE_TENTHS: u128 = 3;

// ---------------------------------------------------------------------------
// TimeoutPolicy
// ---------------------------------------------------------------------------

/// Static bounds for the adaptive timeout.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    pub initial: Duration,
    pub min: Duration,
    pub max: Duration,
    pub max_retries: u32,
    pub backoff_factor: f64,
}

impl TimeoutPolicy {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            initial: config.initial(),
            min: config.min(),
            max: config.max().max(config.min()),
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor.max(1.0),
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

#[derive(Debug, Default)]
struct TimeoutState {
    smoothed: Option<Duration>,
    timeout_count: u64,
}

// ---------------------------------------------------------------------------
// AdaptiveTimeout
// ---------------------------------------------------------------------------

/// Latency-tracking timeout manager, one per pipeline.
#[derive(Debug)]
pub struct AdaptiveTimeout {
    policy: TimeoutPolicy,
    state: Mutex<TimeoutState>,
    metrics: Option<Arc<RelayMetrics>>,
}

impl AdaptiveTimeout {
    pub fn new(policy: TimeoutPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(TimeoutState::default()),
            metrics: None,
        }
    }

    /// Also count every timed-out attempt in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<RelayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    /// Timeout for the next backend call.
    pub fn optimal_timeout(&self) -> Duration {
        let state = self.state.lock().expect("timeout state lock poisoned");
        match state.smoothed {
            None => self.policy.initial,
            Some(avg) => (avg * 2).clamp(self.policy.min, self.policy.max),
        }
    }

    /// Fold a successful call's latency into the moving average.
    pub fn update_response_time(&self, sample: Duration) {
        let mut state = self.state.lock().expect("timeout state lock poisoned");
        state.smoothed = Some(match state.smoothed {
            None => sample,
            Some(old) => {
                let nanos = (old.as_nanos() * EWMA_KEEP_TENTHS
                    + sample.as_nanos() * EWMA_SAMPLE_TENTHS)
                    / 10;
                Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            }
        });
    }

    pub fn record_timeout(&self) {
        let mut state = self.state.lock().expect("timeout state lock poisoned");
        state.timeout_count += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_timeout();
        }
    }

    /// Timeout for the attempt after one that used `previous`.
    pub fn next_attempt_timeout(&self, previous: Duration) -> Duration {
        previous
            .mul_f64(self.policy.backoff_factor)
            .min(self.policy.max)
    }

    pub fn smoothed_latency(&self) -> Option<Duration> {
        self.state
            .lock()
            .expect("timeout state lock poisoned")
            .smoothed
    }

    pub fn timeout_count(&self) -> u64 {
        self.state
            .lock()
            .expect("timeout state lock poisoned")
            .timeout_count
    }

    pub fn snapshot(&self) -> TimeoutSnapshot {
        TimeoutSnapshot {
            smoothed_latency_ms: self.smoothed_latency().map(|d| d.as_millis() as u64),
            timeout_count: self.timeout_count(),
            current_timeout_ms: self.optimal_timeout().as_millis() as u64,
        }
    }

    /// Run `op` under the adaptive timeout, retrying transient failures.
    ///
    /// `op` receives the timeout of the current attempt. Each retry uses
    /// `next_attempt_timeout` of the previous one and is announced through
    /// `on_retry(attempt, timeout)` before it starts. On success returns the
    /// value and the latency of the successful attempt, which has already
    /// been folded into the moving average.
    pub async fn call_with_retry<T, F, Fut, R, RFut>(
        &self,
        mut op: F,
        mut on_retry: R,
    ) -> Result<(T, Duration), BackendError>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
        R: FnMut(u32, Duration) -> RFut,
        RFut: Future<Output = ()>,
    {
        let mut timeout = self.optimal_timeout();
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, op(timeout)).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(timeout)),
            };

            let err = match result {
                Ok(value) => {
                    let elapsed = started.elapsed();
                    self.update_response_time(elapsed);
                    return Ok((value, elapsed));
                }
                Err(err) => err,
            };

            if err.is_timeout() {
                self.record_timeout();
            }

            if !err.is_transient() || attempt >= self.policy.max_retries {
                tracing::debug!(attempt, error = %err, "giving up on backend call");
                return Err(err);
            }

            attempt += 1;
            timeout = self.next_attempt_timeout(timeout);
            tracing::warn!(
                attempt,
                next_timeout_ms = timeout.as_millis() as u64,
                error = %err,
                "backend call failed, retrying"
            );
            on_retry(attempt, timeout).await;
        }
    }
}

impl Default for AdaptiveTimeout {
    fn default() -> Self {
        Self::new(TimeoutPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const SEC: Duration = Duration::from_secs(1);

    fn manager() -> AdaptiveTimeout {
        AdaptiveTimeout::default()
    }

    #[test]
    fn test_initial_timeout_before_samples() {
        assert_eq!(manager().optimal_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_steady_samples_clamp_to_min() {
        let m = manager();
        for _ in 0..3 {
            m.update_response_time(SEC);
        }
        assert_eq!(m.smoothed_latency(), Some(SEC));
        // 2 x 1 s is below the 10 s floor.
        assert_eq!(m.optimal_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_outlier_moves_average_by_thirty_percent() {
        let m = manager();
        for _ in 0..3 {
            m.update_response_time(SEC);
        }
        m.update_response_time(Duration::from_secs(11));
        assert_eq!(m.smoothed_latency(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_first_sample_initializes_average() {
        let m = manager();
        m.update_response_time(Duration::from_secs(7));
        assert_eq!(m.smoothed_latency(), Some(Duration::from_secs(7)));
        assert_eq!(m.optimal_timeout(), Duration::from_secs(14));
    }

    #[test]
    fn test_slow_backend_clamps_to_max() {
        let m = manager();
        m.update_response_time(Duration::from_secs(45));
        assert_eq!(m.optimal_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_next_attempt_timeout_backs_off_and_caps() {
        let m = manager();
        assert_eq!(
            m.next_attempt_timeout(Duration::from_secs(15)),
            Duration::from_millis(22_500)
        );
        assert_eq!(
            m.next_attempt_timeout(Duration::from_secs(50)),
            Duration::from_secs(60)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_longer_timeout_succeeds() {
        let m = manager();
        let retries = AtomicU32::new(0);
        let mut announced = Vec::new();

        let result = m
            .call_with_retry(
                |_timeout| async {
                    tokio::time::sleep(Duration::from_secs(20)).await;
                    Ok::<_, BackendError>("hi")
                },
                |attempt, timeout| {
                    retries.fetch_add(1, Ordering::SeqCst);
                    announced.push((attempt, timeout));
                    async {}
                },
            )
            .await;

        let (value, latency) = result.unwrap();
        assert_eq!(value, "hi");
        assert_eq!(latency, Duration::from_secs(20));
        assert_eq!(retries.load(Ordering::SeqCst), 1);
        assert_eq!(announced, vec![(1, Duration::from_millis(22_500))]);
        assert_eq!(m.timeout_count(), 1);
        assert_eq!(m.smoothed_latency(), Some(Duration::from_secs(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_mirrored_into_metrics() {
        let metrics = Arc::new(RelayMetrics::new());
        let m = manager().with_metrics(metrics.clone());

        let result = m
            .call_with_retry(
                |_timeout| async {
                    tokio::time::sleep(Duration::from_secs(20)).await;
                    Ok::<_, BackendError>(())
                },
                |_attempt, _timeout| async {},
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(m.timeout_count(), 1);
        assert_eq!(metrics.snapshot().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_returns_last_timeout() {
        let m = manager();
        let attempts = AtomicU32::new(0);

        let result = m
            .call_with_retry(
                |_timeout| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async {
                        tokio::time::sleep(Duration::from_secs(600)).await;
                        Ok::<_, BackendError>(())
                    }
                },
                |_, _| async {},
            )
            .await;

        match result {
            Err(BackendError::Timeout(last)) => {
                assert_eq!(last, Duration::from_millis(33_750));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(m.timeout_count(), 3);
        assert_eq!(m.smoothed_latency(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_error_is_not_retried() {
        let m = manager();
        let attempts = AtomicU32::new(0);

        let result = m
            .call_with_retry(
                |_| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(BackendError::AuthenticationFailed) }
                },
                |_, _| async {},
            )
            .await;

        assert!(matches!(result, Err(BackendError::AuthenticationFailed)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(m.timeout_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_status_is_retried() {
        let m = manager();
        let attempts = AtomicU32::new(0);

        let result = m
            .call_with_retry(
                |_| {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(BackendError::Status {
                                status: 503,
                                body: "loading model".into(),
                            })
                        } else {
                            Ok(42)
                        }
                    }
                },
                |_, _| async {},
            )
            .await;

        assert_eq!(result.unwrap().0, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_snapshot_reports_current_timeout() {
        let m = manager();
        m.update_response_time(Duration::from_secs(6));
        m.record_timeout();
        let snapshot = m.snapshot();
        assert_eq!(snapshot.smoothed_latency_ms, Some(6_000));
        assert_eq!(snapshot.timeout_count, 1);
        assert_eq!(snapshot.current_timeout_ms, 12_000);
    }
}
