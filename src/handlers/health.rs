//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Configured provider ("openai" or "qwen")
    pub provider: &'static str,
    /// False means every chat message is answered with the fallback reply
    pub credential_configured: bool,
}

/// Health check handler
///
/// Always 200 OK. A missing credential is a valid, degraded mode rather than
/// an outage, so it is reported in the body instead of the status.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let provider = state.provider();

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            provider: provider.name(),
            credential_configured: provider.has_credential(),
        }),
    )
}
