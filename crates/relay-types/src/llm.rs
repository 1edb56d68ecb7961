//! Completion backend request/response types.
//!
//! These types model the OpenAI-compatible chat-completions wire format the
//! relay speaks to its backend, plus the error taxonomy the retry loop uses
//! to decide whether a failure is worth another attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Role of a message in a completion conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request body posted to the completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Non-streaming request; the relay never streams.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            stream: false,
        }
    }
}

/// Response body from the completion backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: String,
}

impl CompletionResponse {
    /// Wrap plain text as a single-choice response.
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ChoiceMessage {
                    content: content.into(),
                },
            }],
        }
    }

    /// Content of the first choice. An empty `choices` array is a backend failure.
    pub fn into_content(self) -> Result<String, BackendError> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(BackendError::EmptyChoices)
    }
}

/// Errors from completion backend calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend returned no choices")]
    EmptyChoices,

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("authentication failed")]
    AuthenticationFailed,
}

impl BackendError {
    /// Whether another attempt with a longer timeout could succeed.
    ///
    /// Timeouts, network failures, 429/5xx statuses, empty choices and
    /// undecodable bodies are transient. Authentication and other 4xx
    /// statuses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout(_)
            | BackendError::Network(_)
            | BackendError::EmptyChoices
            | BackendError::Deserialization(_) => true,
            BackendError::Status { status, .. } => *status == 429 || *status >= 500,
            BackendError::AuthenticationFailed => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_display_fromstr() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            let parsed: MessageRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("tool".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_request_wire_shape() {
        let req = CompletionRequest::new("local-model", vec![ChatMessage::user("hello")], 500);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["model"], "local-model");
        assert_eq!(value["max_tokens"], 500);
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_response_parses_openai_shape() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"hi"}}]}"#;
        let resp: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.into_content().unwrap(), "hi");
    }

    #[test]
    fn test_empty_choices_is_error() {
        let resp: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(resp.into_content(), Err(BackendError::EmptyChoices)));

        let missing: CompletionResponse = serde_json::from_str("{}").unwrap();
        assert!(missing.into_content().is_err());
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(BackendError::Network("reset".into()).is_transient());
        assert!(BackendError::EmptyChoices.is_transient());
        assert!(BackendError::Deserialization("eof".into()).is_transient());
        assert!(
            BackendError::Status {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            BackendError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !BackendError::Status {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!BackendError::AuthenticationFailed.is_transient());
    }

    #[test]
    fn test_is_timeout() {
        assert!(BackendError::Timeout(Duration::from_secs(15)).is_timeout());
        assert!(!BackendError::EmptyChoices.is_timeout());
    }
}
