//! Chat handler
//!
//! One invocation is one [`ChatEvent`] in and one [`ChatReply`] out. [`handle`]
//! never fails: every path, including upstream failures, ends in a JSON reply.
//!
//! Order of checks:
//! 1. `OPTIONS` answers the CORS preflight, any method but `POST` gets 405
//! 2. the body must be a JSON object with a non-empty string `message`
//! 3. without a provider credential the configured fallback reply is returned
//! 4. otherwise the provider is asked, bounded by `provider.timeout_seconds`
//!
//! Upstream HTTP error statuses and replies without completion text are
//! reported in-band as a 200 chat message. Transport failures, timeouts and
//! undecodable bodies are 500s, logged here with the full error.

use crate::error::{AppError, AppResult};
use crate::event::{ChatEvent, ChatReply};
use crate::handlers::AppState;
use crate::metrics::Outcome;
use crate::middleware::RequestId;
use axum::{
    Extension,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{Method, StatusCode},
};
use std::time::{Duration, Instant};

/// Error text for a missing, empty, or unparseable message
pub const MESSAGE_REQUIRED: &str = "Message is required";

fn too_long(max_chars: usize) -> AppError {
    AppError::Validation(format!(
        "Message exceeds maximum length of {} characters",
        max_chars
    ))
}

/// Validated chat request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    message: String,
}

impl ChatRequest {
    /// Parse and validate a raw request body
    ///
    /// The body must be a JSON object whose `message` is a non-empty string of
    /// at most `max_chars` Unicode characters. Whitespace counts as content.
    pub fn parse(body: &str, max_chars: usize) -> AppResult<Self> {
        let required = || AppError::Validation(MESSAGE_REQUIRED.to_string());

        let value: serde_json::Value = serde_json::from_str(body).map_err(|_| required())?;
        let message = value
            .as_object()
            .and_then(|object| object.get("message"))
            .and_then(serde_json::Value::as_str)
            .filter(|message| !message.is_empty())
            .ok_or_else(required)?;

        if message.chars().count() > max_chars {
            return Err(too_long(max_chars));
        }

        Ok(Self {
            message: message.to_string(),
        })
    }

    /// Get the message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Run one invocation end to end
pub async fn handle(state: &AppState, event: &ChatEvent, request_id: RequestId) -> ChatReply {
    let (reply, outcome) = match event.http_method() {
        "OPTIONS" => (ChatReply::preflight(), Outcome::Preflight),
        "POST" => match respond(state, event, request_id).await {
            Ok(answered) => answered,
            Err(e) => {
                let outcome = match &e {
                    AppError::Validation(_) => Outcome::BadRequest,
                    _ => {
                        tracing::error!(
                            request_id = %request_id,
                            provider = state.provider().name(),
                            error = %e,
                            error_detail = ?e,
                            "Chat invocation failed"
                        );
                        Outcome::ServerError
                    }
                };
                (e.into_reply(), outcome)
            }
        },
        other => {
            tracing::debug!(request_id = %request_id, method = other, "Rejecting method");
            (AppError::MethodNotAllowed.into_reply(), Outcome::MethodNotAllowed)
        }
    };

    state.metrics().record_outcome(outcome);
    tracing::info!(
        request_id = %request_id,
        status = reply.status_code(),
        outcome = outcome.as_str(),
        "Chat invocation finished"
    );

    reply
}

/// POST path: validate, then answer from fallback or upstream
async fn respond(
    state: &AppState,
    event: &ChatEvent,
    request_id: RequestId,
) -> AppResult<(ChatReply, Outcome)> {
    let chat = &state.config().chat;
    let request = ChatRequest::parse(event.body(), chat.max_message_chars())?;

    tracing::debug!(
        request_id = %request_id,
        message_length = request.message().chars().count(),
        "Received chat message"
    );

    if !state.provider().has_credential() {
        tracing::info!(
            request_id = %request_id,
            provider = state.provider().name(),
            api_key_env = state.config().provider.api_key_env(),
            "No provider credential configured, answering with fallback reply"
        );
        return Ok((ChatReply::completion(chat.fallback_reply()), Outcome::Fallback));
    }

    match query_provider(state, &request, request_id).await {
        Ok(text) => Ok((ChatReply::completion(&text), Outcome::Completed)),
        Err(AppError::Upstream(e)) => match e.in_band_reply() {
            Some(text) => {
                tracing::warn!(
                    request_id = %request_id,
                    provider = state.provider().name(),
                    error = %e,
                    "Upstream failure reported to the user in-band"
                );
                Ok((ChatReply::completion(&text), Outcome::UpstreamWarning))
            }
            None => Err(AppError::Upstream(e)),
        },
        Err(e) => Err(e),
    }
}

/// Ask the provider for a completion, bounded by the configured timeout
async fn query_provider(
    state: &AppState,
    request: &ChatRequest,
    request_id: RequestId,
) -> AppResult<String> {
    let provider = state.provider();
    let timeout_seconds = state.config().provider.timeout_seconds();
    let system_prompt = state.config().chat.system_prompt();

    let started = Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(timeout_seconds),
        provider.complete(system_prompt, request.message()),
    )
    .await;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    // Metrics failures never fail the request
    if let Err(e) = state
        .metrics()
        .record_upstream_duration(provider.name(), duration_ms)
    {
        tracing::error!(
            request_id = %request_id,
            error = %e,
            duration_ms,
            "Metrics recording failed (non-fatal)"
        );
    }

    match result {
        Ok(Ok(text)) => {
            tracing::info!(
                request_id = %request_id,
                provider = provider.name(),
                response_length = text.chars().count(),
                duration_ms,
                "Upstream completion received"
            );
            Ok(text)
        }
        Ok(Err(e)) => {
            state
                .metrics()
                .upstream_failure(provider.name(), e.kind_label());
            Err(AppError::Upstream(e))
        }
        Err(_elapsed) => {
            state.metrics().upstream_failure(provider.name(), "timeout");
            tracing::error!(
                request_id = %request_id,
                provider = provider.name(),
                timeout_seconds,
                "Upstream request timed out"
            );
            Err(AppError::UpstreamTimeout {
                provider: provider.name(),
                timeout_seconds,
            })
        }
    }
}

/// Any-method handler for `/`
///
/// Converts the HTTP request into a [`ChatEvent`] so the server and the
/// serverless surface share one code path. A body that is not UTF-8 is
/// treated as empty and fails validation.
///
/// A body axum refuses to buffer (over the body limit, or a broken stream)
/// still gets a JSON reply: POST is answered by [`reject_body`], other
/// methods are dispatched without a body.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> ChatReply {
    let body = match body {
        Ok(bytes) => String::from_utf8(bytes.to_vec()).unwrap_or_default(),
        Err(rejection) if method == Method::POST => {
            return reject_body(&state, &rejection, request_id);
        }
        Err(_) => String::new(),
    };
    let event = ChatEvent::new(method.as_str(), Some(body));
    handle(&state, &event, request_id).await
}

/// Reply for a POST whose body could not be read
///
/// Over the limit is the same 400 as an over-long message; anything else is
/// a server error.
fn reject_body(state: &AppState, rejection: &BytesRejection, request_id: RequestId) -> ChatReply {
    let (error, outcome) = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        (
            too_long(state.config().chat.max_message_chars()),
            Outcome::BadRequest,
        )
    } else {
        (
            AppError::Internal(format!(
                "Failed to read request body: {}",
                rejection.body_text()
            )),
            Outcome::ServerError,
        )
    };

    tracing::warn!(
        request_id = %request_id,
        status = rejection.status().as_u16(),
        error = %rejection.body_text(),
        "Request body rejected"
    );

    state.metrics().record_outcome(outcome);
    error.into_reply()
}
