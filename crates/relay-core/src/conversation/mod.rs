//! Conversation state: per-chat history and rolling summarization.

pub mod store;
pub mod summarizer;

pub use store::{ConversationStore, SummaryJob};
pub use summarizer::ConversationSummarizer;
