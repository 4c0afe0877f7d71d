//! Configuration management for chatrelay
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every section is optional; missing values fall back to defaults that match
//! the hosted chat widget (OpenAI, `gpt-4o-mini`, 300 tokens, temperature 0.7).
//!
//! Credentials never live in the file. The provider section names an
//! environment variable (`api_key_env`) that is read once at start-up.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Default system prompt sent ahead of every user message
pub const DEFAULT_SYSTEM_PROMPT: &str = "Ты дружелюбный AI чат-бот. Отвечай коротко и по делу, используй эмодзи. Будь полезным и позитивным.";

/// Reply returned when the provider has no credential configured
pub const DEFAULT_FALLBACK_REPLY: &str =
    "🤔 Интересно! Расскажи подробнее. (Подключи OpenAI API ключ для полноценной работы)";

/// Maximum allowed message length in characters (100K chars)
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 100_000;

/// Worst-case JSON bytes per message character (`\uXXXX` escape)
const MAX_JSON_BYTES_PER_CHAR: usize = 6;

/// Room for the rest of the request object around `message`
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Upper bound for `provider.timeout_seconds`
const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Which upstream API answers chat messages
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions`
    #[default]
    OpenAi,
    /// DashScope text-generation API (Qwen models)
    Qwen,
}

impl ProviderKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Qwen => "qwen",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Qwen => "qwen-turbo",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Qwen => "https://dashscope.aliyuncs.com/api/v1",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Qwen => "DASHSCOPE_API_KEY",
        }
    }
}

/// Upstream provider configuration
///
/// Fields are private so validated values cannot be mutated afterwards.
/// `model`, `base_url` and `api_key_env` default per [`ProviderKind`] when left
/// out of the file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default)]
    kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key_env: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_temperature")]
    temperature: f64,
    /// Resolved from the environment, never read from or written to TOML
    #[serde(skip)]
    api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: None,
            base_url: None,
            api_key_env: None,
            timeout_seconds: default_timeout_seconds(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key: None,
        }
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    300
}

fn default_temperature() -> f64 {
    0.7
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Model identifier sent upstream
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.kind.default_model())
    }

    /// API base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
            .trim_end_matches('/')
    }

    /// Name of the environment variable holding the credential
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.kind.default_api_key_env())
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Resolved credential, if any
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Replace the credential. Empty or whitespace-only keys count as absent.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    /// Resolve the credential through `lookup`, keyed by [`Self::api_key_env`]
    ///
    /// `lookup` is `std::env::var` in production; tests pass a closure.
    pub fn resolve_api_key<F>(&mut self, lookup: F)
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let resolved = lookup(self.api_key_env()).filter(|key| !key.trim().is_empty());
        tracing::debug!(
            provider = self.kind.as_str(),
            api_key_env = self.api_key_env(),
            credential_found = resolved.is_some(),
            "Resolved provider credential"
        );
        self.api_key = resolved;
    }
}

/// Chat behaviour configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    system_prompt: String,
    #[serde(default = "default_fallback_reply")]
    fallback_reply: String,
    #[serde(default = "default_max_message_chars")]
    max_message_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            fallback_reply: default_fallback_reply(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.to_string()
}

fn default_max_message_chars() -> usize {
    DEFAULT_MAX_MESSAGE_CHARS
}

impl ChatConfig {
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn fallback_reply(&self) -> &str {
        &self.fallback_reply
    }

    /// Longest accepted message, counted in Unicode characters
    pub fn max_message_chars(&self) -> usize {
        self.max_message_chars
    }

    /// Largest HTTP request body accepted, sized so any message within
    /// `max_message_chars` fits even when fully escaped
    pub fn max_body_bytes(&self) -> usize {
        self.max_message_chars
            .saturating_mul(MAX_JSON_BYTES_PER_CHAR)
            .saturating_add(BODY_OVERHEAD_BYTES)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Does not touch the environment; see [`Config::load`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            crate::error::AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            }
        })?;

        config
            .validate()
            .map_err(|e| crate::error::AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load configuration for the running process
    ///
    /// Reads `path` when it exists, otherwise starts from defaults, then
    /// resolves the provider credential from the environment.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::error::AppResult<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config
            .provider
            .resolve_api_key(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// Called by `from_file()` and `from_str()`; call it explicitly when
    /// building a `Config` by hand.
    pub fn validate(&self) -> crate::error::AppResult<()> {
        let provider = &self.provider;
        let base_url = provider.base_url();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(crate::error::AppError::Config(format!(
                "provider.base_url '{}' must start with 'http://' or 'https://'",
                base_url
            )));
        }

        if provider.model().trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "provider.model cannot be empty".to_string(),
            ));
        }

        if provider.api_key_env().trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "provider.api_key_env cannot be empty".to_string(),
            ));
        }

        if provider.timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "provider.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if provider.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(crate::error::AppError::Config(format!(
                "provider.timeout_seconds cannot exceed {} seconds, got {}",
                MAX_TIMEOUT_SECONDS, provider.timeout_seconds
            )));
        }

        if provider.max_tokens == 0 {
            return Err(crate::error::AppError::Config(
                "provider.max_tokens must be greater than 0".to_string(),
            ));
        }

        if !provider.temperature.is_finite()
            || provider.temperature < 0.0
            || provider.temperature > 2.0
        {
            return Err(crate::error::AppError::Config(format!(
                "provider.temperature must be a finite number between 0.0 and 2.0, got {}",
                provider.temperature
            )));
        }

        if self.chat.system_prompt.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "chat.system_prompt cannot be empty".to_string(),
            ));
        }

        if self.chat.fallback_reply.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "chat.fallback_reply cannot be empty".to_string(),
            ));
        }

        if self.chat.max_message_chars == 0 {
            return Err(crate::error::AppError::Config(
                "chat.max_message_chars must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = crate::error::AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(toml_str).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            }
        })?;

        config.validate()?;
        Ok(config)
    }
}
