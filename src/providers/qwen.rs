//! DashScope (Qwen) text-generation provider.
//!
//! DashScope answers in one of two result formats. The plain `text` format
//! puts the completion at `output.text`; the `message` format mirrors OpenAI
//! and puts it under `choices[0].message.content`, either at the top level
//! (compatible-mode gateways) or nested in `output`. They are tried in that
//! order.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{
    ChatProvider, PromptMessage, ProviderError, first_text, post_json, preview, prompt_messages,
};
use crate::config::ProviderConfig;

const GENERATION_PATH: &str = "/services/aigc/text-generation/generation";

const COMPLETION_POINTERS: [&str; 3] = [
    "/output/text",
    "/choices/0/message/content",
    "/output/choices/0/message/content",
];

pub struct QwenProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f64,
}

impl QwenProvider {
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
struct GenerationRequest<'a> {
    model: &'a str,
    input: GenerationInput<'a>,
    parameters: GenerationParameters,
}

#[derive(Serialize)]
struct GenerationInput<'a> {
    messages: [PromptMessage<'a>; 2],
}

#[derive(Serialize)]
struct GenerationParameters {
    max_tokens: u32,
    temperature: f64,
}

/// Pull the completion text out of a DashScope reply
fn extract_completion(value: &serde_json::Value) -> Option<&str> {
    first_text(value, &COMPLETION_POINTERS)
}

#[async_trait]
impl ChatProvider for QwenProvider {
    fn name(&self) -> &'static str {
        "qwen"
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.base_url, GENERATION_PATH);
        let request = GenerationRequest {
            model: &self.model,
            input: GenerationInput {
                messages: prompt_messages(system_prompt, user_message),
            },
            parameters: GenerationParameters {
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        };

        tracing::debug!(model = %self.model, url = %url, "Requesting text generation");

        let (value, raw) = post_json(
            &self.client,
            self.name(),
            &url,
            self.api_key.as_deref(),
            &request,
        )
        .await?;

        match extract_completion(&value) {
            Some(text) => Ok(text.to_string()),
            None => {
                tracing::warn!(
                    provider = self.name(),
                    body_preview = %preview(&raw),
                    "Upstream reply has neither output.text nor choices"
                );
                Err(ProviderError::UnrecognizedResponse {
                    preview: preview(&raw),
                })
            }
        }
    }
}
