//! Conversation summarizer for rolling history compaction.
//!
//! `ConversationSummarizer` turns a `SummaryJob` snapshot into the prompt,
//! request and cache fingerprint used to condense an overgrown history. The
//! network call itself is made by the pipeline so that it goes through the
//! same adaptive timeout and retry loop as live requests.

use std::hash::{DefaultHasher, Hash, Hasher};

use relay_types::llm::{ChatMessage, CompletionRequest};

use super::store::SummaryJob;

/// Opening line of every summarization prompt.
const SUMMARY_PROMPT_HEADER: &str = "Summarize the following conversation:\n\n";

/// Stateless helpers for conversation summarization.
pub struct ConversationSummarizer;

impl ConversationSummarizer {
    /// Prompt text: the header, the previous summary if any, then one
    /// `role: content` line per turn.
    pub fn build_prompt(job: &SummaryJob) -> String {
        let mut prompt = String::from(SUMMARY_PROMPT_HEADER);
        if let Some(previous) = &job.previous_summary {
            prompt.push_str(&format!("earlier summary: {previous}\n"));
        }
        for turn in &job.turns {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
        }
        prompt
    }

    pub fn build_request(job: &SummaryJob, model: &str, max_tokens: u32) -> CompletionRequest {
        CompletionRequest::new(
            model,
            vec![ChatMessage::user(Self::build_prompt(job))],
            max_tokens,
        )
    }

    /// Hash of the history a summary was produced from.
    ///
    /// Content is normalized (trimmed, lowercased) before hashing so that
    /// identical conversations map to the same cached summary.
    pub fn fingerprint(job: &SummaryJob) -> u64 {
        let mut hasher = DefaultHasher::new();
        job.previous_summary
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .hash(&mut hasher);
        for turn in &job.turns {
            turn.role.to_string().hash(&mut hasher);
            turn.content.trim().to_lowercase().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Clean up backend output before storing it as the summary.
    pub fn finish(raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}
