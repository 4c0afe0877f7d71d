//! HTTP request handlers for the chatrelay API

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::providers::{ChatProvider, build_provider};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{any, get},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod chat;
pub mod health;
pub mod metrics;

/// Application state shared across all handlers
///
/// Everything inside is immutable or internally synchronized, so cloning the
/// state per request is a handful of Arc bumps.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    provider: Arc<dyn ChatProvider>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new AppState from configuration
    ///
    /// Builds the provider selected by `config.provider.kind()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the metrics registry cannot be created.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let provider = build_provider(&config.provider)?;
        Self::with_provider(config, provider)
    }

    /// Create an AppState around an already-built provider
    pub fn with_provider(config: Arc<Config>, provider: Arc<dyn ChatProvider>) -> AppResult<Self> {
        let metrics = Metrics::new().map_err(|e| {
            AppError::Internal(format!("Failed to initialize metrics registry: {}", e))
        })?;

        Ok(Self {
            config,
            provider,
            metrics: Arc::new(metrics),
        })
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the chat provider
    pub fn provider(&self) -> &dyn ChatProvider {
        self.provider.as_ref()
    }

    /// Get reference to the metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Build the HTTP application: chat on `/`, plus health and metrics
///
/// Request bodies are capped at `chat.max_body_bytes()`; larger POSTs get the
/// JSON length error instead of axum's plain-text 413.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config().chat.max_body_bytes();

    Router::new()
        .route("/", any(chat::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        "[server]\nhost = \"127.0.0.1\"\nport = 3000\n"
            .parse()
            .expect("should parse test config")
    }

    #[test]
    fn test_appstate_new_creates_state() {
        let state = AppState::new(Arc::new(create_test_config())).expect("should create state");

        assert_eq!(state.config().server.port, 3000);
        assert_eq!(state.provider().name(), "openai");
        assert!(!state.provider().has_credential());
    }

    #[test]
    fn test_appstate_is_clonable() {
        let state = AppState::new(Arc::new(create_test_config())).unwrap();

        let state2 = state.clone();
        assert_eq!(state2.config().server.port, 3000);
    }

    #[test]
    fn test_appstate_clones_share_metrics() {
        let state = AppState::new(Arc::new(create_test_config())).unwrap();
        let state2 = state.clone();

        state2
            .metrics()
            .record_outcome(crate::metrics::Outcome::Fallback);
        assert_eq!(
            state
                .metrics()
                .outcome_count(crate::metrics::Outcome::Fallback),
            1
        );
    }
}
