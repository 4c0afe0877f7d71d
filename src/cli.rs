//! Command-line interface for chatrelay
//!
//! Provides argument parsing and subcommand handling for the chatrelay binary.

use crate::error::{AppError, AppResult};
use crate::event::ChatEvent;
use crate::handlers::{AppState, chat};
use crate::middleware::RequestId;
use clap::{Parser, Subcommand};

/// Stateless chat relay for OpenAI and Qwen
#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(version)]
#[command(about = "Stateless chat relay for OpenAI and Qwen")]
#[command(
    long_about = "chatrelay accepts a chat message, forwards it to the configured LLM provider \
    (OpenAI or Qwen/DashScope) and returns the reply as JSON. Without an API key it answers \
    with a fixed fallback message."
)]
pub struct Cli {
    /// Path to configuration file (defaults are used when it does not exist)
    #[arg(short, long, default_value = "chatrelay.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Handle a single serverless event and print the reply
    Invoke {
        /// Event JSON file ({"httpMethod": ..., "body": ...}); reads stdin if not specified
        #[arg(short, long)]
        event: Option<String>,
    },
}

/// Run one event through the chat handler and return the reply as JSON
///
/// # Errors
///
/// Returns a validation error if `event_json` is not a valid event. Handler
/// failures are not errors here; they come back as error replies.
pub async fn invoke(state: &AppState, event_json: &str) -> AppResult<String> {
    let event: ChatEvent = serde_json::from_str(event_json)
        .map_err(|e| AppError::Validation(format!("Invalid event JSON: {}", e)))?;

    let reply = chat::handle(state, &event, RequestId::new()).await;

    serde_json::to_string(&reply)
        .map_err(|e| AppError::Internal(format!("Failed to encode reply: {}", e)))
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# chatrelay Configuration
# =======================
#
# Every section is optional. Values shown are the defaults.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 3000

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDER
# ─────────────────────────────────────────────────────────────────────────────
#
# kind selects the upstream API:
#   - "openai": POST {base_url}/chat/completions
#       defaults: base_url = "https://api.openai.com/v1", model = "gpt-4o-mini",
#                 api_key_env = "OPENAI_API_KEY"
#   - "qwen":   POST {base_url}/services/aigc/text-generation/generation
#       defaults: base_url = "https://dashscope.aliyuncs.com/api/v1", model = "qwen-turbo",
#                 api_key_env = "DASHSCOPE_API_KEY"
#
# The API key is read from the environment variable named by api_key_env when
# the process starts. It is never read from this file. When the variable is
# unset or empty, every message is answered with chat.fallback_reply.

[provider]
kind = "openai"
# model = "gpt-4o-mini"
# base_url = "https://api.openai.com/v1"
# api_key_env = "OPENAI_API_KEY"

# Upstream request timeout in seconds (1-300)
timeout_seconds = 30

# Generation limits
max_tokens = 300
temperature = 0.7

# ─────────────────────────────────────────────────────────────────────────────
# CHAT
# ─────────────────────────────────────────────────────────────────────────────

[chat]
system_prompt = "Ты дружелюбный AI чат-бот. Отвечай коротко и по делу, используй эмодзи. Будь полезным и позитивным."
fallback_reply = "🤔 Интересно! Расскажи подробнее. (Подключи OpenAI API ключ для полноценной работы)"

# Longest accepted message, in characters
max_message_chars = 100000

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProviderKind};
    use clap::CommandFactory;
    use std::str::FromStr;
    use std::sync::Arc;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::parse_from(["chatrelay"]);
        assert_eq!(cli.config, "chatrelay.toml");
        assert!(cli.command.is_none());
    }

    #[test]
    fn custom_config_path() {
        let cli = Cli::parse_from(["chatrelay", "--config", "custom.toml"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn config_subcommand_with_output() {
        let cli = Cli::parse_from(["chatrelay", "config", "-o", "my-config.toml"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config { output: Some(ref path) }) if path == "my-config.toml"
        ));
    }

    #[test]
    fn invoke_subcommand_reads_stdin_by_default() {
        let cli = Cli::parse_from(["chatrelay", "invoke"]);
        assert!(matches!(cli.command, Some(Command::Invoke { event: None })));
    }

    #[test]
    fn invoke_subcommand_with_event_file() {
        let cli = Cli::parse_from(["chatrelay", "invoke", "--event", "event.json"]);
        assert!(matches!(
            cli.command,
            Some(Command::Invoke { event: Some(ref path) }) if path == "event.json"
        ));
    }

    #[test]
    fn template_parses_to_default_config() {
        let config = Config::from_str(generate_config_template())
            .expect("template should be a valid config");
        let defaults = Config::default();

        assert_eq!(config.provider.kind(), ProviderKind::OpenAi);
        assert_eq!(config.provider.model(), defaults.provider.model());
        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(
            config.chat.system_prompt(),
            defaults.chat.system_prompt()
        );
        assert_eq!(
            config.chat.fallback_reply(),
            defaults.chat.fallback_reply()
        );
    }

    #[test]
    fn template_has_all_sections() {
        let template = generate_config_template();
        assert!(template.contains("[server]"));
        assert!(template.contains("[provider]"));
        assert!(template.contains("[chat]"));
        assert!(template.contains("[observability]"));
    }

    #[tokio::test]
    async fn invoke_returns_fallback_reply_json() {
        let state = AppState::new(Arc::new(Config::default())).unwrap();
        let output = invoke(
            &state,
            r#"{"httpMethod": "POST", "body": "{\"message\": \"hello\"}"}"#,
        )
        .await
        .expect("invoke should succeed");

        let reply: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(reply["statusCode"], 200);
        let body: serde_json::Value =
            serde_json::from_str(reply["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["response"], crate::config::DEFAULT_FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn invoke_rejects_malformed_event() {
        let state = AppState::new(Arc::new(Config::default())).unwrap();
        let err = invoke(&state, "not an event").await.unwrap_err();
        assert!(err.to_string().contains("Invalid event JSON"));
    }
}
