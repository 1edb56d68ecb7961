//! Bounded per-chat conversation history.
//!
//! Each chat owns an ordered list of turns plus an optional rolling summary
//! of turns that were trimmed away. Mutation of one chat happens under that
//! chat's map entry lock. Growth past `max_history` is resolved by
//! summarization: `begin_summary` hands out a snapshot (at most one per
//! chat at a time) and `apply_summary` later replaces everything but the
//! most recent turns of that snapshot with the summary. A hard limit drops
//! the oldest turns outright if summarization keeps failing.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use relay_types::chat::{ChatTurn, ConversationSnapshot};
use relay_types::config::ConversationConfig;
use relay_types::llm::ChatMessage;

/// Prefix of the system message carrying the rolling summary.
pub const SUMMARY_CONTEXT_PREFIX: &str = "Summary of the earlier conversation: ";

#[derive(Debug)]
struct Conversation {
    turns: Vec<ChatTurn>,
    summary: Option<String>,
    last_active: DateTime<Utc>,
    summarizing: bool,
    /// Turns dropped from the front since creation, by any means.
    trimmed: u64,
}

impl Conversation {
    fn new() -> Self {
        Self {
            turns: Vec::new(),
            summary: None,
            last_active: Utc::now(),
            summarizing: false,
            trimmed: 0,
        }
    }

    fn drop_front(&mut self, count: usize) {
        let count = count.min(self.turns.len());
        self.turns.drain(..count);
        self.trimmed += count as u64;
    }
}

/// History snapshot handed to the summarizer.
#[derive(Debug, Clone)]
pub struct SummaryJob {
    pub chat_id: String,
    /// Full history at the moment summarization was scheduled.
    pub turns: Vec<ChatTurn>,
    pub previous_summary: Option<String>,
    trimmed_at_start: u64,
}

/// Per-chat history store.
#[derive(Debug)]
pub struct ConversationStore {
    chats: DashMap<String, Conversation>,
    max_history: usize,
    keep_recent: usize,
    hard_limit: usize,
}

impl ConversationStore {
    pub fn new(config: &ConversationConfig) -> Self {
        let max_history = config.max_history.max(1);
        Self {
            chats: DashMap::new(),
            max_history,
            keep_recent: config.keep_recent.min(max_history),
            hard_limit: config.effective_hard_limit().max(max_history),
        }
    }

    /// Create an empty history for `chat_id` if none exists.
    ///
    /// Returns `true` when a new conversation was created.
    pub fn init(&self, chat_id: &str) -> bool {
        if self.chats.contains_key(chat_id) {
            return false;
        }
        let mut created = false;
        self.chats.entry(chat_id.to_string()).or_insert_with(|| {
            created = true;
            Conversation::new()
        });
        if created {
            tracing::debug!(chat_id, "conversation created");
        }
        created
    }

    /// Append a turn, creating the conversation if needed.
    ///
    /// Returns the history length after the append (and after any hard
    /// limit trim).
    pub fn append(&self, chat_id: &str, turn: ChatTurn) -> usize {
        let mut entry = self
            .chats
            .entry(chat_id.to_string())
            .or_insert_with(Conversation::new);
        let conversation = entry.value_mut();
        conversation.last_active = turn.at;
        conversation.turns.push(turn);

        let len = conversation.turns.len();
        if len > self.hard_limit {
            let excess = len - self.hard_limit;
            conversation.drop_front(excess);
            tracing::warn!(
                chat_id,
                dropped = excess,
                hard_limit = self.hard_limit,
                "history over hard limit, dropped oldest turns"
            );
        }
        conversation.turns.len()
    }

    /// Snapshot the history for summarization if it has outgrown
    /// `max_history` and no summary is already running for this chat.
    pub fn begin_summary(&self, chat_id: &str) -> Option<SummaryJob> {
        let mut entry = self.chats.get_mut(chat_id)?;
        let conversation = entry.value_mut();
        if conversation.summarizing || conversation.turns.len() <= self.max_history {
            return None;
        }

        conversation.summarizing = true;
        Some(SummaryJob {
            chat_id: chat_id.to_string(),
            turns: conversation.turns.clone(),
            previous_summary: conversation.summary.clone(),
            trimmed_at_start: conversation.trimmed,
        })
    }

    /// Store `summary` and keep only the last `keep_recent` turns of the
    /// job's snapshot plus anything appended since it was taken.
    pub fn apply_summary(&self, job: &SummaryJob, summary: String) {
        let Some(mut entry) = self.chats.get_mut(&job.chat_id) else {
            return;
        };
        let conversation = entry.value_mut();

        let summarized = job.turns.len().saturating_sub(self.keep_recent);
        let already_dropped =
            usize::try_from(conversation.trimmed - job.trimmed_at_start).unwrap_or(usize::MAX);
        conversation.drop_front(summarized.saturating_sub(already_dropped));
        conversation.summary = Some(summary);
        conversation.summarizing = false;

        tracing::debug!(
            chat_id = %job.chat_id,
            summarized,
            remaining = conversation.turns.len(),
            "conversation summarized"
        );
    }

    /// Release the in-flight marker after a failed summarization. History
    /// is left untouched; the next threshold breach tries again.
    pub fn abort_summary(&self, chat_id: &str) {
        if let Some(mut entry) = self.chats.get_mut(chat_id) {
            entry.value_mut().summarizing = false;
        }
    }

    /// Messages to send to the backend: the rolling summary as a leading
    /// system message, then the raw history.
    pub fn context(&self, chat_id: &str) -> Vec<ChatMessage> {
        let Some(entry) = self.chats.get(chat_id) else {
            return Vec::new();
        };
        let conversation = entry.value();

        let mut messages = Vec::with_capacity(conversation.turns.len() + 1);
        if let Some(summary) = &conversation.summary {
            messages.push(ChatMessage::system(format!("{SUMMARY_CONTEXT_PREFIX}{summary}")));
        }
        messages.extend(conversation.turns.iter().map(ChatMessage::from));
        messages
    }

    pub fn snapshot(&self, chat_id: &str) -> Option<ConversationSnapshot> {
        self.chats.get(chat_id).map(|entry| {
            let conversation = entry.value();
            ConversationSnapshot {
                chat_id: chat_id.to_string(),
                turns: conversation.turns.clone(),
                summary: conversation.summary.clone(),
                last_active: conversation.last_active,
            }
        })
    }

    pub fn history_len(&self, chat_id: &str) -> usize {
        self.chats.get(chat_id).map_or(0, |entry| entry.turns.len())
    }

    pub fn is_summarizing(&self, chat_id: &str) -> bool {
        self.chats
            .get(chat_id)
            .is_some_and(|entry| entry.summarizing)
    }

    /// Number of chats with a history.
    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}
