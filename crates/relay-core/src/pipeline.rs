//! The request-dispatch pipeline.
//!
//! `RelayPipeline` wires the rate limiter, response cache, batching queue,
//! worker pool, adaptive timeout manager and conversation store around a
//! completion backend and a transport:
//!
//! ```text
//! inbound -> rate limiter -> conversation init -> cache lookup
//!         -> batching queue -> worker pool -> backend (timeout + retry)
//!         -> cache store + history append -> reply
//! ```
//!
//! Background work (batch window timer, cache sweep, rate-limiter sweep and
//! summarization tasks) is owned by the pipeline: started in `start`,
//! tracked by a `TaskTracker`, and stopped by `shutdown`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use relay_types::cache::{CachedValue, CompletionRecord, normalize_prompt, summary_key};
use relay_types::chat::ChatTurn;
use relay_types::config::RelayConfig;
use relay_types::error::PipelineError;
use relay_types::llm::{BackendError, CompletionRequest};
use relay_types::message::{InboundMessage, MessageBatch, MessageKind};
use relay_types::metrics::PipelineStatus;

use crate::backend::CompletionBackend;
use crate::cache::ResponseCache;
use crate::conversation::{ConversationStore, ConversationSummarizer, SummaryJob};
use crate::dispatch::{BatchProcessor, BatchQueue, WorkerPool};
use crate::metrics::RelayMetrics;
use crate::rate_limit::RateLimiter;
use crate::timeout::{AdaptiveTimeout, TimeoutPolicy};
use crate::transport::Transport;

pub const RATE_LIMIT_NOTICE: &str = "You are sending messages too fast. Please wait a moment.";
pub const TIMEOUT_NOTICE: &str =
    "The response is still taking too long. Please try a shorter message.";
pub const FAILURE_NOTICE: &str =
    "I'm having trouble processing your request right now. Please try again.";
pub const IMAGE_ACK: &str = "✅ Image received";

pub fn document_ack(name: &str) -> String {
    format!("✅ Document received: {name}")
}

pub fn retry_notice(timeout: Duration) -> String {
    format!("Retrying with longer timeout ({}s)...", timeout.as_secs())
}

/// What happened to an inbound message at the front door.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued for the backend (or for an acknowledgement).
    Queued,
    /// Answered from the response cache.
    Cached,
    /// Rejected by the sender's rate limit; the sender was told.
    RateLimited,
}

/// Externally constructed collaborators and shared state.
pub struct PipelineDeps<B, T> {
    pub backend: Arc<B>,
    pub transport: Arc<T>,
    pub metrics: Arc<RelayMetrics>,
    pub limiter: Arc<RateLimiter>,
}

impl<B, T> PipelineDeps<B, T> {
    /// Fresh metrics and a rate limiter built from `config`.
    pub fn new(config: &RelayConfig, backend: Arc<B>, transport: Arc<T>) -> Self {
        Self {
            backend,
            transport,
            metrics: Arc::new(RelayMetrics::new()),
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
        }
    }
}

#[derive(Debug)]
struct DispatchSettings {
    model: String,
    max_tokens: u32,
    cache_ttl: Duration,
    summary_deadline: Duration,
}

// ---------------------------------------------------------------------------
// Dispatcher: the batch processor
// ---------------------------------------------------------------------------

/// Everything a worker needs to answer a batch. Cheap to clone.
struct Dispatcher<B, T> {
    backend: Arc<B>,
    transport: Arc<T>,
    cache: Arc<ResponseCache>,
    timeouts: Arc<AdaptiveTimeout>,
    conversations: Arc<ConversationStore>,
    metrics: Arc<RelayMetrics>,
    settings: Arc<DispatchSettings>,
    summaries: TaskTracker,
    cancel: CancellationToken,
}

impl<B, T> Clone for Dispatcher<B, T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            transport: self.transport.clone(),
            cache: self.cache.clone(),
            timeouts: self.timeouts.clone(),
            conversations: self.conversations.clone(),
            metrics: self.metrics.clone(),
            settings: self.settings.clone(),
            summaries: self.summaries.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<B: CompletionBackend, T: Transport> BatchProcessor for Dispatcher<B, T> {
    async fn process(&self, batch: MessageBatch) {
        self.metrics.record_batch();
        let kind = batch.kind;
        tracing::debug!(%kind, size = batch.len(), "processing batch");

        // Arrival order within a batch is preserved.
        for message in batch.messages {
            match kind {
                MessageKind::Text => self.answer_text(&message).await,
                MessageKind::Image => self.deliver(&message, IMAGE_ACK).await,
                MessageKind::Document => {
                    self.deliver(&message, &document_ack(&message.content)).await
                }
            }
        }
    }
}

impl<B: CompletionBackend, T: Transport> Dispatcher<B, T> {
    fn cached_completion(&self, key: &str) -> Option<CompletionRecord> {
        match self.cache.get(key)? {
            CachedValue::Completion(record) => Some(record),
            CachedValue::Summary(_) => None,
        }
    }

    #[tracing::instrument(
        name = "answer_text",
        skip_all,
        fields(chat_id = %message.chat_id, message_id = %message.id)
    )]
    async fn answer_text(&self, message: &InboundMessage) {
        let key = normalize_prompt(&message.content);
        self.conversations
            .append(&message.chat_id, ChatTurn::user(message.content.clone()));

        let request = CompletionRequest::new(
            &self.settings.model,
            self.conversations.context(&message.chat_id),
            self.settings.max_tokens,
        );

        let outcome = self
            .timeouts
            .call_with_retry(
                |_timeout| {
                    self.metrics.record_backend_call();
                    let response = self.backend.complete(&request);
                    async move { response.await.and_then(|r| r.into_content()) }
                },
                |_attempt, timeout| {
                    self.metrics.record_retry();
                    let notice = retry_notice(timeout);
                    let chat_id = message.chat_id.as_str();
                    async move { self.notify(chat_id, &notice).await }
                },
            )
            .await;

        match outcome {
            Ok((content, latency)) => {
                let record = CompletionRecord::new(content, latency.as_millis() as u64);
                self.metrics.record_response(latency, record.tokens);
                tracing::debug!(
                    latency_ms = record.latency_ms,
                    tokens = record.tokens,
                    backend = self.backend.name(),
                    "backend answered"
                );

                self.conversations
                    .append(&message.chat_id, ChatTurn::assistant(record.content.clone()));
                let reply = record.content.clone();
                self.cache.set(
                    key,
                    CachedValue::Completion(record),
                    self.settings.cache_ttl,
                );
                self.deliver(message, &reply).await;
                self.maybe_summarize(&message.chat_id);
            }
            Err(err) => {
                self.metrics.record_failure();
                tracing::error!(error = %err, "request failed");
                let notice = if err.is_timeout() {
                    TIMEOUT_NOTICE
                } else {
                    FAILURE_NOTICE
                };
                self.notify(&message.chat_id, notice).await;
            }
        }
    }

    /// Send a reply, then mark the message read if the send succeeded.
    async fn deliver(&self, message: &InboundMessage, text: &str) {
        if let Err(err) = self.transport.send_text(&message.chat_id, text).await {
            tracing::warn!(chat_id = %message.chat_id, error = %err, "failed to send reply");
            return;
        }
        if let Err(err) = self
            .transport
            .mark_read(&message.chat_id, &message.id, &message.sender_id)
            .await
        {
            tracing::warn!(chat_id = %message.chat_id, error = %err, "failed to mark message read");
        }
    }

    /// Send a notice; failures are logged and dropped.
    async fn notify(&self, chat_id: &str, text: &str) {
        if let Err(err) = self.transport.send_text(chat_id, text).await {
            tracing::warn!(chat_id, error = %err, "failed to send notice");
        }
    }

    fn maybe_summarize(&self, chat_id: &str) {
        let Some(job) = self.conversations.begin_summary(chat_id) else {
            return;
        };
        let this = self.clone();
        self.summaries.spawn(async move { this.run_summary(job).await });
    }

    #[tracing::instrument(
        name = "summarize_conversation",
        skip_all,
        fields(chat_id = %job.chat_id, turns = job.turns.len())
    )]
    async fn run_summary(&self, job: SummaryJob) {
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(self.settings.summary_deadline, self.summarize(&job)) => Some(result),
        };

        match outcome {
            Some(Ok(Ok(summary))) => {
                self.conversations.apply_summary(&job, summary);
                self.metrics.record_summary(true);
            }
            Some(Ok(Err(err))) => {
                tracing::warn!(error = %err, "summarization failed, history left untrimmed");
                self.conversations.abort_summary(&job.chat_id);
                self.metrics.record_summary(false);
            }
            Some(Err(_)) => {
                tracing::warn!(
                    deadline_secs = self.settings.summary_deadline.as_secs(),
                    "summarization exceeded its deadline"
                );
                self.conversations.abort_summary(&job.chat_id);
                self.metrics.record_summary(false);
            }
            None => {
                tracing::debug!("summarization abandoned on shutdown");
                self.conversations.abort_summary(&job.chat_id);
            }
        }
    }

    async fn summarize(&self, job: &SummaryJob) -> Result<String, BackendError> {
        let key = summary_key(ConversationSummarizer::fingerprint(job));
        if let Some(CachedValue::Summary(summary)) = self.cache.get(&key) {
            tracing::debug!("summary served from cache");
            return Ok(summary);
        }

        let request = ConversationSummarizer::build_request(
            job,
            &self.settings.model,
            self.settings.max_tokens,
        );
        let (raw, _latency) = self
            .timeouts
            .call_with_retry(
                |_timeout| {
                    self.metrics.record_backend_call();
                    let response = self.backend.complete(&request);
                    async move { response.await.and_then(|r| r.into_content()) }
                },
                |_attempt, _timeout| {
                    self.metrics.record_retry();
                    async {}
                },
            )
            .await?;

        let summary = ConversationSummarizer::finish(&raw).ok_or(BackendError::EmptyChoices)?;
        self.cache.set(
            key,
            CachedValue::Summary(summary.clone()),
            self.settings.cache_ttl,
        );
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// RelayPipeline
// ---------------------------------------------------------------------------

/// A running dispatch pipeline. Construct with [`RelayPipeline::start`]
/// inside a tokio runtime.
pub struct RelayPipeline<B, T> {
    dispatcher: Arc<Dispatcher<B, T>>,
    queue: BatchQueue<Dispatcher<B, T>>,
    pool: Arc<WorkerPool>,
    limiter: Arc<RateLimiter>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    /// Serializes close/wait/reopen on the shared trackers.
    drain_lock: tokio::sync::Mutex<()>,
}

impl<B: CompletionBackend, T: Transport> RelayPipeline<B, T> {
    /// Build every component from `config` and start the background tasks.
    pub fn start(config: &RelayConfig, deps: PipelineDeps<B, T>) -> Self {
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let cache = Arc::new(ResponseCache::new(config.cache.capacity));
        let pool = Arc::new(WorkerPool::new(config.queue.workers));
        let dispatcher = Arc::new(Dispatcher {
            backend: deps.backend,
            transport: deps.transport,
            cache: cache.clone(),
            timeouts: Arc::new(
                AdaptiveTimeout::new(TimeoutPolicy::from_config(&config.timeout))
                    .with_metrics(deps.metrics.clone()),
            ),
            conversations: Arc::new(ConversationStore::new(&config.conversation)),
            metrics: deps.metrics,
            settings: Arc::new(DispatchSettings {
                model: config.backend.model.clone(),
                max_tokens: config.backend.max_tokens,
                cache_ttl: config.cache.ttl(),
                summary_deadline: config.timeout.summary_deadline(),
            }),
            summaries: TaskTracker::new(),
            cancel: cancel.clone(),
        });

        {
            let interval = config.cache.cleanup_interval();
            let cancel = cancel.clone();
            tracker.spawn(async move { cache.run_sweeper(interval, cancel).await });
        }
        {
            let limiter = deps.limiter.clone();
            let idle_ttl = config.rate_limit.idle_ttl();
            let interval = config.rate_limit.sweep_interval();
            let cancel = cancel.clone();
            tracker.spawn(async move { limiter.run_sweeper(idle_ttl, interval, cancel).await });
        }

        let queue = BatchQueue::start(
            &config.queue,
            pool.clone(),
            dispatcher.clone(),
            &tracker,
            cancel.clone(),
        );

        tracing::info!(
            backend = dispatcher.backend.name(),
            workers = pool.capacity(),
            batch_size = config.queue.batch_size,
            batch_window_ms = config.queue.batch_window_ms,
            cache_capacity = config.cache.capacity,
            "relay pipeline started"
        );

        Self {
            dispatcher,
            queue,
            pool,
            limiter: deps.limiter,
            tracker,
            cancel,
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Admit, short-circuit from cache, or queue one inbound message.
    #[tracing::instrument(
        name = "handle_inbound",
        skip_all,
        fields(chat_id = %message.chat_id, sender_id = %message.sender_id, kind = %message.kind)
    )]
    pub async fn handle_inbound(&self, message: InboundMessage) -> Result<Admission, PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::ShuttingDown);
        }

        let d = &self.dispatcher;
        if !self.limiter.allow(&message.sender_id) {
            d.metrics.record_rate_limited();
            tracing::debug!("sender rate limited");
            d.notify(&message.chat_id, RATE_LIMIT_NOTICE).await;
            return Ok(Admission::RateLimited);
        }

        d.metrics.record_request();
        d.conversations.init(&message.chat_id);

        if message.kind == MessageKind::Text {
            let key = normalize_prompt(&message.content);
            if let Some(record) = d.cached_completion(&key) {
                d.metrics.record_cache_hit();
                tracing::debug!("answered from cache");
                d.conversations
                    .append(&message.chat_id, ChatTurn::user(message.content.clone()));
                d.conversations
                    .append(&message.chat_id, ChatTurn::assistant(record.content.clone()));
                d.deliver(&message, &record.content).await;
                d.maybe_summarize(&message.chat_id);
                return Ok(Admission::Cached);
            }
            d.metrics.record_cache_miss();
        }

        self.queue.enqueue(message)?;
        Ok(Admission::Queued)
    }

    /// Flush every open batch and wait for all resulting work, including
    /// summaries it scheduled, to finish.
    ///
    /// Concurrent callers are serialized.
    pub async fn drain(&self) -> Result<(), PipelineError> {
        let _guard = self.drain_lock.lock().await;
        self.queue.flush().await?;
        self.pool.wait().await;

        let summaries = &self.dispatcher.summaries;
        summaries.close();
        summaries.wait().await;
        summaries.reopen();
        Ok(())
    }

    /// Drain outstanding work, then stop every background task.
    pub async fn shutdown(&self) {
        tracing::info!("relay pipeline shutting down");
        if let Err(err) = self.drain().await {
            tracing::warn!(error = %err, "drain before shutdown failed");
        }

        self.cancel.cancel();
        self.pool.stop();
        self.tracker.close();
        self.tracker.wait().await;

        let summaries = &self.dispatcher.summaries;
        summaries.close();
        summaries.wait().await;
        tracing::info!("relay pipeline stopped");
    }

    pub fn status(&self) -> PipelineStatus {
        let d = &self.dispatcher;
        PipelineStatus {
            metrics: d.metrics.snapshot(),
            cache: d.cache.stats(),
            timeout: d.timeouts.snapshot(),
            active_chats: d.conversations.len(),
            tracked_senders: self.limiter.len(),
            in_flight_batches: self.pool.in_flight(),
            worker_capacity: self.pool.capacity(),
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.dispatcher.conversations
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.dispatcher.cache
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.dispatcher.metrics
    }

    pub fn open_batch_len(&self, kind: MessageKind) -> usize {
        self.queue.open_batch_len(kind)
    }
}
