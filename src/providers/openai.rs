//! OpenAI-compatible chat completions provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{
    ChatProvider, PromptMessage, ProviderError, first_text, post_json, preview, prompt_messages,
};
use crate::config::ProviderConfig;

/// Calls `{base_url}/chat/completions` and reads `choices[0].message.content`
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: super::http_client(config.timeout_seconds())?,
            base_url: config.base_url().to_string(),
            model: config.model().to_string(),
            api_key: config.api_key().map(str::to_string),
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [PromptMessage<'a>; 2],
    max_tokens: u32,
    temperature: f64,
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = CompletionRequest {
            model: &self.model,
            messages: prompt_messages(system_prompt, user_message),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        tracing::debug!(model = %self.model, url = %url, "Requesting chat completion");

        let (value, raw) = post_json(
            &self.client,
            self.name(),
            &url,
            self.api_key.as_deref(),
            &request,
        )
        .await?;

        first_text(&value, &["/choices/0/message/content"])
            .map(str::to_string)
            .ok_or_else(|| ProviderError::UnrecognizedResponse {
                preview: preview(&raw),
            })
    }
}
