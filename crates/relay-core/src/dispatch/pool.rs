//! Concurrency-bounded worker pool.
//!
//! Admission is a semaphore of `capacity` permits: `submit` waits for a
//! permit, then runs the task on its own tokio task holding that permit.
//! The permit is released when the task ends for any reason, including a
//! panic, because it lives inside the spawned future. Spawned tasks are
//! tracked so `wait` can block until everything submitted so far finished.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Semaphore};
use tokio_util::task::TaskTracker;

use relay_types::error::PoolError;

/// Fixed-capacity pool of concurrently running tasks.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    capacity: usize,
    stopped: AtomicBool,
    /// Held across close/wait/reopen so overlapping waits cannot reopen
    /// the tracker under each other.
    wait_lock: Mutex<()>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            tracker: TaskTracker::new(),
            capacity,
            stopped: AtomicBool::new(false),
            wait_lock: Mutex::new(()),
        }
    }

    /// Wait for a free slot, then run `task` in the background.
    ///
    /// Returns `PoolError::Stopped` if the pool was stopped before or while
    /// waiting for a slot.
    pub async fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PoolError::Stopped);
        }

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Stopped)?;

        self.tracker.spawn(async move {
            let _permit = permit;
            task.await;
        });
        Ok(())
    }

    /// Block until every task submitted so far has finished. Concurrent
    /// callers wait one after another.
    pub async fn wait(&self) {
        let _guard = self.wait_lock.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Refuse further submissions. Running tasks are left to finish.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.permits.close();
            tracing::info!(in_flight = self.in_flight(), "worker pool stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Tracks current and peak concurrency across submitted tasks.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_rounds_take_twice_the_task_duration() {
        const N: usize = 4;
        let d = Duration::from_secs(1);
        let pool = WorkerPool::new(N);
        let gauge = Arc::new(Gauge::default());
        let start = Instant::now();

        for _ in 0..2 * N {
            let gauge = gauge.clone();
            pool.submit(async move {
                gauge.enter();
                tokio::time::sleep(d).await;
                gauge.exit();
            })
            .await
            .unwrap();
        }
        pool.wait().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= 2 * d, "finished too early: {elapsed:?}");
        assert!(elapsed < 2 * d + Duration::from_millis(100), "took too long: {elapsed:?}");
        assert_eq!(gauge.done.load(Ordering::SeqCst), 2 * N);
        assert!(gauge.peak.load(Ordering::SeqCst) <= N);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), N);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_waits_both_return() {
        let pool = WorkerPool::new(2);
        let gauge = Arc::new(Gauge::default());
        for secs in [1, 2] {
            let gauge = gauge.clone();
            pool.submit(async move {
                gauge.enter();
                tokio::time::sleep(Duration::from_secs(secs)).await;
                gauge.exit();
            })
            .await
            .unwrap();
        }

        tokio::join!(pool.wait(), pool.wait());
        assert_eq!(gauge.done.load(Ordering::SeqCst), 2);

        // The tracker was reopened: later work is still accepted and awaited.
        pool.submit(async {}).await.unwrap();
        pool.wait().await;
    }

    #[tokio::test]
    async fn test_submit_after_stop_fails() {
        let pool = WorkerPool::new(2);
        pool.stop();
        assert!(pool.is_stopped());
        let result = pool.submit(async {}).await;
        assert_eq!(result, Err(PoolError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_running_tasks_finish() {
        let pool = WorkerPool::new(1);
        let gauge = Arc::new(Gauge::default());
        {
            let gauge = gauge.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                gauge.exit();
            })
            .await
            .unwrap();
        }
        pool.stop();
        pool.wait().await;
        assert_eq!(gauge.done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_releases_slot() {
        let pool = WorkerPool::new(1);
        pool.submit(async { panic!("boom") }).await.unwrap();
        pool.wait().await;

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        pool.submit(async move { flag.store(true, Ordering::SeqCst) })
            .await
            .unwrap();
        pool.wait().await;
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_can_be_called_repeatedly() {
        let pool = WorkerPool::new(2);
        pool.wait().await;
        pool.submit(async {}).await.unwrap();
        pool.wait().await;
        pool.submit(async {}).await.unwrap();
        pool.wait().await;
        assert_eq!(pool.capacity(), 2);
    }
}
