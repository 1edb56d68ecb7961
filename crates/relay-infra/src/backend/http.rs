//! HttpCompletionBackend -- concrete [`CompletionBackend`] for
//! OpenAI-compatible `/v1/chat/completions` endpoints.
//!
//! Posts a non-streaming [`CompletionRequest`] as JSON and reads the first
//! choice back. No client-side timeout is configured: the pipeline wraps
//! every call in its adaptive timeout, and dropping the future cancels the
//! in-flight request.
//!
//! The optional API key is wrapped in [`secrecy::SecretString`] and is only
//! exposed when building the `Authorization` header.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use relay_core::backend::CompletionBackend;
use relay_types::config::BackendConfig;
use relay_types::llm::{BackendError, CompletionRequest, CompletionResponse};

/// TCP connect limit. Separate from the adaptive request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Completion backend speaking the OpenAI chat-completions wire format.
///
/// # API Key Security
///
/// Does NOT derive Debug. The key is held as a [`SecretString`] and never
/// appears in logs.
pub struct HttpCompletionBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
}

impl HttpCompletionBackend {
    /// Create a backend posting to `url`.
    pub fn new(url: impl Into<String>, api_key: Option<SecretString>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    pub fn from_config(
        config: &BackendConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, BackendError> {
        Self::new(config.url.clone(), api_key)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Map a transport-level reqwest failure onto the relay's error type.
fn map_send_error(err: reqwest::Error) -> BackendError {
    if err.is_decode() {
        BackendError::Deserialization(err.to_string())
    } else {
        BackendError::Network(err.to_string())
    }
}

impl CompletionBackend for HttpCompletionBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
        tracing::debug!(
            url = %self.url,
            model = %request.model,
            messages = request.messages.len(),
            "posting completion request"
        );

        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => BackendError::AuthenticationFailed,
                code => BackendError::Status { status: code, body },
            });
        }

        let bytes = response.bytes().await.map_err(map_send_error)?;
        serde_json::from_slice::<CompletionResponse>(&bytes).map_err(|e| {
            BackendError::Deserialization(format!("failed to parse response: {e}"))
        })
    }
}
