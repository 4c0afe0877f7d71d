//! Upstream chat providers
//!
//! The relay talks to exactly one provider per process, chosen by
//! `provider.kind`. Both providers share the same contract: one system prompt,
//! one user message in, one completion text out.
//!
//! Upstream failures fall into two groups. HTTP error statuses and replies
//! without recognizable completion text are reported *in-band* (see
//! [`ProviderError::in_band_reply`]) so the chat UI still shows a message.
//! Everything else (transport, client construction, non-JSON bodies) becomes
//! a server error at the handler boundary.

use crate::config::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod openai;
pub mod qwen;

pub use openai::OpenAiProvider;
pub use qwen::QwenProvider;

/// Prefix of the in-band reply for upstream HTTP error statuses
pub const API_ERROR_PREFIX: &str = "⚠️ Ошибка API: ";

/// Prefix of the in-band reply for upstream bodies without completion text
pub const UNRECOGNIZED_PREFIX: &str = "🔍 Неожиданный ответ API: ";

/// How many characters of an unrecognized upstream body are echoed back
pub const PREVIEW_CHARS: usize = 100;

/// Errors raised while asking a provider for a completion
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("upstream response carried no completion text: {preview}")]
    UnrecognizedResponse { preview: String },

    #[error("upstream response was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ProviderError {
    /// Chat text to show the user instead of failing the request, if any
    pub fn in_band_reply(&self) -> Option<String> {
        match self {
            Self::Status { status, .. } => Some(format!("{}{}", API_ERROR_PREFIX, status)),
            Self::UnrecognizedResponse { preview } => {
                Some(format!("{}{}", UNRECOGNIZED_PREFIX, preview))
            }
            Self::Client(_) | Self::Request(_) | Self::Decode(_) => None,
        }
    }

    /// Bounded label for the failure metrics
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Client(_) => "client",
            Self::Request(_) => "request",
            Self::Status { .. } => "status",
            Self::UnrecognizedResponse { .. } => "unrecognized",
            Self::Decode(_) => "decode",
        }
    }
}

/// A chat completion backend
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Label used in logs, metrics and the health endpoint
    fn name(&self) -> &'static str;

    /// Whether a credential is configured. Without one the handler answers
    /// with the fallback reply and never calls [`ChatProvider::complete`].
    fn has_credential(&self) -> bool;

    /// Ask the model to answer `user_message` under `system_prompt`
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ProviderError>;
}

/// Build the provider selected by `config.kind()`
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn ChatProvider>, ProviderError> {
    let provider: Arc<dyn ChatProvider> = match config.kind() {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config)?),
        ProviderKind::Qwen => Arc::new(QwenProvider::new(config)?),
    };

    tracing::info!(
        provider = provider.name(),
        model = config.model(),
        base_url = config.base_url(),
        timeout_seconds = config.timeout_seconds(),
        credential_configured = provider.has_credential(),
        "Chat provider ready"
    );

    Ok(provider)
}

/// One entry of the two-message prompt both providers send
#[derive(Debug, Serialize)]
pub(crate) struct PromptMessage<'a> {
    role: &'static str,
    content: &'a str,
}

pub(crate) fn prompt_messages<'a>(
    system_prompt: &'a str,
    user_message: &'a str,
) -> [PromptMessage<'a>; 2] {
    [
        PromptMessage {
            role: "system",
            content: system_prompt,
        },
        PromptMessage {
            role: "user",
            content: user_message,
        },
    ]
}

pub(crate) fn http_client(timeout_seconds: u64) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(ProviderError::Client)
}

/// First [`PREVIEW_CHARS`] characters of `raw`, never splitting a character
pub(crate) fn preview(raw: &str) -> String {
    raw.chars().take(PREVIEW_CHARS).collect()
}

/// POST `body` as JSON and return the parsed reply plus its raw text
///
/// Non-2xx statuses become [`ProviderError::Status`]; the error body is kept
/// for logging only.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &Client,
    provider: &'static str,
    url: &str,
    api_key: Option<&str>,
    body: &B,
) -> Result<(serde_json::Value, String), ProviderError> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            provider,
            status = status.as_u16(),
            body_preview = %preview(&body),
            "Upstream returned an error status"
        );
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let raw = response.text().await?;
    let value = serde_json::from_str(&raw)?;
    Ok((value, raw))
}

/// Return the first string found at any of `pointers`, in order
pub(crate) fn first_text<'v>(value: &'v serde_json::Value, pointers: &[&str]) -> Option<&'v str> {
    pointers
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(serde_json::Value::as_str))
}
