//! Response cache value and key types.
//!
//! The cache stores two kinds of value: completions keyed by the normalized
//! prompt, and conversation summaries keyed by a fingerprint of the history
//! that produced them.

use serde::{Deserialize, Serialize};

/// A completed backend answer together with how it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub content: String,
    /// Whitespace-delimited word count of `content`.
    pub tokens: u32,
    pub latency_ms: u64,
}

impl CompletionRecord {
    pub fn new(content: impl Into<String>, latency_ms: u64) -> Self {
        let content = content.into();
        let tokens = count_tokens(&content);
        Self {
            content,
            tokens,
            latency_ms,
        }
    }
}

/// Everything the response cache can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CachedValue {
    Completion(CompletionRecord),
    Summary(String),
}

impl CachedValue {
    pub fn as_completion(&self) -> Option<&CompletionRecord> {
        match self {
            CachedValue::Completion(record) => Some(record),
            CachedValue::Summary(_) => None,
        }
    }

    pub fn as_summary(&self) -> Option<&str> {
        match self {
            CachedValue::Summary(text) => Some(text),
            CachedValue::Completion(_) => None,
        }
    }
}

/// Cache key for a user prompt: trimmed, inner whitespace collapsed, lowercased.
pub fn normalize_prompt(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cache key for a conversation summary.
pub fn summary_key(fingerprint: u64) -> String {
    format!("summary:{fingerprint:016x}")
}

/// Approximate token count used for metrics: whitespace-delimited words.
pub fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prompt() {
        assert_eq!(normalize_prompt("  Hello   World \n"), "hello world");
        assert_eq!(normalize_prompt("hello world"), normalize_prompt("HELLO\tworld"));
        assert_eq!(normalize_prompt("   "), "");
    }

    #[test]
    fn test_summary_key_is_prefixed() {
        let key = summary_key(0xabc);
        assert!(key.starts_with("summary:"));
        assert_eq!(key, "summary:0000000000000abc");
    }

    #[test]
    fn test_count_tokens() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("one two  three\nfour"), 4);
    }

    #[test]
    fn test_completion_record_counts_tokens() {
        let record = CompletionRecord::new("hi there friend", 120);
        assert_eq!(record.tokens, 3);
        assert_eq!(record.latency_ms, 120);
    }

    #[test]
    fn test_cached_value_accessors() {
        let completion = CachedValue::Completion(CompletionRecord::new("hi", 1));
        assert_eq!(completion.as_completion().unwrap().content, "hi");
        assert!(completion.as_summary().is_none());

        let summary = CachedValue::Summary("they talked".to_string());
        assert_eq!(summary.as_summary(), Some("they talked"));
        assert!(summary.as_completion().is_none());
    }

    #[test]
    fn test_cached_value_tagged_json() {
        let json = serde_json::to_string(&CachedValue::Summary("s".into())).unwrap();
        assert_eq!(json, r#"{"type":"summary","value":"s"}"#);
    }
}
