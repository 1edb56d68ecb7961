//! Inbound message and batch types.
//!
//! An `InboundMessage` is what a transport hands to the pipeline. Messages
//! are grouped by `MessageKind` into `MessageBatch`es while they wait for
//! the batching queue to flush them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Kind of inbound message. Batches are keyed by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Document,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Image => write!(f, "image"),
            MessageKind::Document => write!(f, "document"),
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "document" | "doc" => Ok(MessageKind::Document),
            other => Err(format!("invalid message kind: '{other}'")),
        }
    }
}

/// A message received from a transport. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport-assigned message ID (UUIDv7 when the transport has none).
    pub id: String,
    pub kind: MessageKind,
    /// Text body for `Text`, caption for `Image`, file name for `Document`.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Conversation the message belongs to; replies go here.
    pub chat_id: String,
    /// Author of the message; rate limiting is per sender.
    pub sender_id: String,
}

impl InboundMessage {
    /// Build a message with a fresh UUIDv7 ID and the current timestamp.
    pub fn new(
        kind: MessageKind,
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            chat_id: chat_id.into(),
            sender_id: sender_id.into(),
        }
    }

    /// Shorthand for a text message.
    pub fn text(
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::Text, chat_id, sender_id, content)
    }
}

/// Messages of one kind accumulated by the batching queue, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBatch {
    pub kind: MessageKind,
    pub messages: Vec<InboundMessage>,
}

impl MessageBatch {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: InboundMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_display_fromstr() {
        for kind in [MessageKind::Text, MessageKind::Image, MessageKind::Document] {
            let parsed: MessageKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert_eq!("DOC".parse::<MessageKind>().unwrap(), MessageKind::Document);
        assert!("video".parse::<MessageKind>().is_err());
    }

    #[test]
    fn test_message_kind_serializes_lowercase() {
        let json = serde_json::to_string(&MessageKind::Document).unwrap();
        assert_eq!(json, "\"document\"");
    }

    #[test]
    fn test_inbound_message_ids_are_unique() {
        let a = InboundMessage::text("chat-1", "alice", "hello");
        let b = InboundMessage::text("chat-1", "alice", "hello");
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind, MessageKind::Text);
        assert_eq!(a.chat_id, "chat-1");
        assert_eq!(a.sender_id, "alice");
    }

    #[test]
    fn test_batch_preserves_arrival_order() {
        let mut batch = MessageBatch::new(MessageKind::Text);
        assert!(batch.is_empty());
        batch.push(InboundMessage::text("c", "s", "first"));
        batch.push(InboundMessage::text("c", "s", "second"));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.messages[0].content, "first");
        assert_eq!(batch.messages[1].content, "second");
    }
}
