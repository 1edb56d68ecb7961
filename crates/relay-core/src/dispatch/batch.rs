//! Time/size-windowed batching queue.
//!
//! Messages enter through a bounded intake channel (`enqueue` never waits)
//! and are grouped by `MessageKind` into one open batch per kind. A batch
//! is flushed to the worker pool as soon as it reaches `batch_size`, and
//! every open batch is flushed on each tick of the batch window. A flushed
//! batch is removed from the map in the same critical section that finds
//! it, so no message is ever handed out twice.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use relay_types::config::QueueConfig;
use relay_types::error::{PoolError, QueueError};
use relay_types::message::{InboundMessage, MessageBatch, MessageKind};

use super::pool::WorkerPool;

/// Executes one flushed batch. Runs on a worker pool slot.
///
/// Implementations handle per-message failures themselves; a batch cannot
/// fail as a whole.
pub trait BatchProcessor: Send + Sync + 'static {
    fn process(&self, batch: MessageBatch) -> impl Future<Output = ()> + Send;
}

/// Items carried by the intake channel. Flush requests travel the same
/// channel as messages so they observe every earlier `enqueue`.
enum Intake {
    Message(InboundMessage),
    Flush(oneshot::Sender<()>),
}

/// Open batches plus what is needed to hand them off.
struct BatchState<P> {
    open: Mutex<HashMap<MessageKind, MessageBatch>>,
    batch_size: usize,
    pool: Arc<WorkerPool>,
    processor: Arc<P>,
}

impl<P: BatchProcessor> BatchState<P> {
    /// Append under the map lock; returns the batch if it just filled up.
    fn add_to_batch(&self, message: InboundMessage) -> Option<MessageBatch> {
        let mut open = self.open.lock().expect("batch map lock poisoned");
        let kind = message.kind;
        let batch = open
            .entry(kind)
            .or_insert_with(|| MessageBatch::new(kind));
        batch.push(message);

        if batch.len() >= self.batch_size {
            open.remove(&kind)
        } else {
            None
        }
    }

    /// Remove every open batch in one critical section.
    fn take_all(&self) -> Vec<MessageBatch> {
        let mut open = self.open.lock().expect("batch map lock poisoned");
        open.drain().map(|(_, batch)| batch).collect()
    }

    async fn dispatch(&self, batch: MessageBatch) -> Result<(), PoolError> {
        tracing::debug!(kind = %batch.kind, size = batch.len(), "flushing batch");
        let processor = self.processor.clone();
        self.pool
            .submit(async move { processor.process(batch).await })
            .await
    }

    async fn flush_all(&self) -> Result<(), PoolError> {
        for batch in self.take_all() {
            self.dispatch(batch).await?;
        }
        Ok(())
    }

    fn open_len(&self, kind: MessageKind) -> usize {
        self.open
            .lock()
            .expect("batch map lock poisoned")
            .get(&kind)
            .map_or(0, MessageBatch::len)
    }
}

/// Handle to a running batching queue.
pub struct BatchQueue<P> {
    intake: mpsc::Sender<Intake>,
    state: Arc<BatchState<P>>,
}

impl<P: BatchProcessor> BatchQueue<P> {
    /// Start the batcher task on `tracker`. It runs until `cancel` fires.
    pub fn start(
        config: &QueueConfig,
        pool: Arc<WorkerPool>,
        processor: Arc<P>,
        tracker: &TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.intake_capacity.max(1));
        let state = Arc::new(BatchState {
            open: Mutex::new(HashMap::new()),
            batch_size: config.batch_size.max(1),
            pool,
            processor,
        });

        tracker.spawn(run_batcher(state.clone(), rx, config.batch_window(), cancel));

        Self { intake: tx, state }
    }

    /// Queue a message without waiting.
    pub fn enqueue(&self, message: InboundMessage) -> Result<(), QueueError> {
        self.intake
            .try_send(Intake::Message(message))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })
    }

    /// Flush every open batch, including messages still in the intake.
    ///
    /// Returns once the batches are handed to the pool, not once they finish.
    pub async fn flush(&self) -> Result<(), QueueError> {
        let (tx, rx) = oneshot::channel();
        self.intake
            .send(Intake::Flush(tx))
            .await
            .map_err(|_| QueueError::Closed)?;
        rx.await.map_err(|_| QueueError::Closed)
    }

    /// Messages waiting in the open batch for `kind`.
    pub fn open_batch_len(&self, kind: MessageKind) -> usize {
        self.state.open_len(kind)
    }
}

#[tracing::instrument(name = "batcher", skip_all, fields(window_ms = window.as_millis() as u64))]
async fn run_batcher<P: BatchProcessor>(
    state: Arc<BatchState<P>>,
    mut rx: mpsc::Receiver<Intake>,
    window: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            item = rx.recv() => match item {
                Some(Intake::Message(message)) => match state.add_to_batch(message) {
                    Some(batch) => state.dispatch(batch).await,
                    None => Ok(()),
                },
                Some(Intake::Flush(done)) => {
                    let result = state.flush_all().await;
                    let _ = done.send(());
                    result
                }
                None => break,
            },
            _ = ticker.tick() => state.flush_all().await,
        };

        if let Err(err) = result {
            tracing::error!(error = %err, "worker pool rejected batch, batcher exiting");
            return;
        }
    }

    let pending: usize = state.take_all().iter().map(MessageBatch::len).sum::<usize>()
        + std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|item| matches!(item, Intake::Message(_)))
            .count();
    if pending > 0 {
        tracing::warn!(pending, "batcher stopped with unflushed messages");
    }
}
