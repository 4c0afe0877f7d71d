//! Error types for chatrelay
//!
//! Every error that can reach the handler boundary maps onto a JSON reply, so
//! callers always receive a well-formed body. All errors implement
//! `IntoResponse` for Axum handlers.

use crate::event::ChatReply;
use crate::providers::ProviderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Validation(String),

    #[error("Server error: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Server error: request to {provider} timed out after {timeout_seconds} seconds")]
    UpstreamTimeout {
        provider: &'static str,
        timeout_seconds: u64,
    },

    #[error("Server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error is reported with
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Upstream(_)
            | Self::UpstreamTimeout { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert into the `{"error": ...}` reply returned to the caller
    ///
    /// Only the display message is exposed. Source chains stay in the logs.
    pub fn into_reply(self) -> ChatReply {
        ChatReply::error(self.status(), &self.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_reply().into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
