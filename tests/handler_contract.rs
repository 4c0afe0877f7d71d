//! Contract tests for a single chat invocation
//!
//! Drives `handlers::chat::handle` with serverless events and stub providers
//! and checks the status, headers and body of every reply path.

use async_trait::async_trait;
use chatrelay::{
    config::{Config, DEFAULT_FALLBACK_REPLY},
    event::{
        ALLOW_HEADERS, ALLOW_METHODS, ALLOW_ORIGIN, CONTENT_TYPE, ChatEvent, ChatReply, MAX_AGE,
    },
    handlers::{AppState, chat},
    metrics::Outcome,
    middleware::RequestId,
    providers::{ChatProvider, ProviderError},
};
use std::sync::{Arc, Mutex};

/// Records the prompt it was asked and answers with a canned result
struct StubProvider {
    credential: bool,
    answer: fn() -> Result<String, ProviderError>,
    seen: Mutex<Vec<(String, String)>>,
}

impl StubProvider {
    fn new(credential: bool, answer: fn() -> Result<String, ProviderError>) -> Self {
        Self {
            credential,
            answer,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ProviderError> {
        self.seen
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_message.to_string()));
        (self.answer)()
    }
}

fn state_with(provider: Arc<StubProvider>) -> AppState {
    AppState::with_provider(Arc::new(Config::default()), provider).expect("should create state")
}

async fn invoke(state: &AppState, event: ChatEvent) -> ChatReply {
    chat::handle(state, &event, RequestId::new()).await
}

fn body_json(reply: &ChatReply) -> serde_json::Value {
    serde_json::from_str(reply.body()).expect("body should be JSON")
}

fn assert_json_headers(reply: &ChatReply) {
    assert_eq!(reply.header(CONTENT_TYPE), Some("application/json"));
    assert_eq!(reply.header(ALLOW_ORIGIN), Some("*"));
}

fn hello() -> Result<String, ProviderError> {
    Ok("Привет! 👋".to_string())
}

#[tokio::test]
async fn test_options_returns_preflight_headers_and_empty_body() {
    let provider = Arc::new(StubProvider::new(true, hello));
    let state = state_with(provider.clone());

    let reply = invoke(&state, ChatEvent::new("OPTIONS", None)).await;

    assert_eq!(reply.status_code(), 200);
    assert_eq!(reply.body(), "");
    assert_eq!(reply.header(ALLOW_ORIGIN), Some("*"));
    assert_eq!(reply.header(ALLOW_METHODS), Some("POST, OPTIONS"));
    assert_eq!(reply.header(ALLOW_HEADERS), Some("Content-Type"));
    assert_eq!(reply.header(MAX_AGE), Some("86400"));
    assert_eq!(reply.header(CONTENT_TYPE), None);
    assert!(provider.calls().is_empty(), "preflight must not call upstream");
}

#[tokio::test]
async fn test_options_ignores_body() {
    let state = state_with(Arc::new(StubProvider::new(true, hello)));
    let reply = invoke(
        &state,
        ChatEvent::new("OPTIONS", Some("definitely not json".to_string())),
    )
    .await;
    assert_eq!(reply, ChatReply::preflight());
}

#[tokio::test]
async fn test_non_post_methods_are_rejected() {
    let provider = Arc::new(StubProvider::new(true, hello));
    let state = state_with(provider.clone());

    for method in ["GET", "PUT", "DELETE", "PATCH", "HEAD", ""] {
        let reply = invoke(
            &state,
            ChatEvent::new(method, Some(r#"{"message":"hi"}"#.to_string())),
        )
        .await;
        assert_eq!(reply.status_code(), 405, "method {:?}", method);
        assert_json_headers(&reply);
        assert_eq!(
            body_json(&reply),
            serde_json::json!({"error": "Method not allowed"})
        );
    }

    assert!(provider.calls().is_empty());
    assert_eq!(state.metrics().outcome_count(Outcome::MethodNotAllowed), 6);
}

#[tokio::test]
async fn test_event_without_method_is_rejected() {
    let state = state_with(Arc::new(StubProvider::new(true, hello)));
    let event: ChatEvent = serde_json::from_str(r#"{"body": "{\"message\":\"hi\"}"}"#).unwrap();

    let reply = invoke(&state, event).await;

    assert_eq!(reply.status_code(), 405);
}

#[tokio::test]
async fn test_bad_bodies_are_rejected_before_upstream() {
    let provider = Arc::new(StubProvider::new(true, hello));
    let state = state_with(provider.clone());

    let bodies = [
        None,
        Some("{}"),
        Some(r#"{"message": ""}"#),
        Some(r#"{"message": 7}"#),
        Some("not json"),
        Some(r#"["message"]"#),
    ];

    for body in bodies {
        let reply = invoke(&state, ChatEvent::new("POST", body.map(str::to_string))).await;
        assert_eq!(reply.status_code(), 400, "body {:?}", body);
        assert_json_headers(&reply);
        assert_eq!(
            body_json(&reply),
            serde_json::json!({"error": "Message is required"})
        );
    }

    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_oversized_message_is_rejected() {
    let config: Config = "[chat]\nmax_message_chars = 5\n".parse().unwrap();
    let provider = Arc::new(StubProvider::new(true, hello));
    let state = AppState::with_provider(Arc::new(config), provider.clone()).unwrap();

    let reply = invoke(&state, ChatEvent::post(r#"{"message":"123456"}"#)).await;

    assert_eq!(reply.status_code(), 400);
    assert_eq!(
        body_json(&reply)["error"],
        "Message exceeds maximum length of 5 characters"
    );
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_missing_credential_returns_fallback_without_upstream_call() {
    let provider = Arc::new(StubProvider::new(false, hello));
    let state = state_with(provider.clone());

    let reply = invoke(&state, ChatEvent::post(r#"{"message":"Привет"}"#)).await;

    assert_eq!(reply.status_code(), 200);
    assert_json_headers(&reply);
    assert_eq!(
        body_json(&reply),
        serde_json::json!({"response": DEFAULT_FALLBACK_REPLY})
    );
    assert!(provider.calls().is_empty());
    assert_eq!(state.metrics().outcome_count(Outcome::Fallback), 1);
}

#[tokio::test]
async fn test_fallback_with_real_provider_and_no_key() {
    let state = AppState::new(Arc::new(Config::default())).unwrap();

    let reply = invoke(&state, ChatEvent::post(r#"{"message":"hello"}"#)).await;

    assert_eq!(reply.status_code(), 200);
    assert_eq!(body_json(&reply)["response"], DEFAULT_FALLBACK_REPLY);
}

#[tokio::test]
async fn test_configured_fallback_reply_is_used() {
    let config: Config = "[chat]\nfallback_reply = \"offline\"\n".parse().unwrap();
    let state = AppState::with_provider(
        Arc::new(config),
        Arc::new(StubProvider::new(false, hello)),
    )
    .unwrap();

    let reply = invoke(&state, ChatEvent::post(r#"{"message":"hello"}"#)).await;

    assert_eq!(body_json(&reply)["response"], "offline");
}

#[tokio::test]
async fn test_completion_passes_system_prompt_and_message() {
    let provider = Arc::new(StubProvider::new(true, hello));
    let state = state_with(provider.clone());

    let reply = invoke(
        &state,
        ChatEvent::post(r#"{"message":"Как дела?","extra":true}"#),
    )
    .await;

    assert_eq!(reply.status_code(), 200);
    assert_eq!(body_json(&reply), serde_json::json!({"response": "Привет! 👋"}));

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, state.config().chat.system_prompt());
    assert_eq!(calls[0].1, "Как дела?");
}

#[tokio::test]
async fn test_whitespace_only_message_is_forwarded() {
    let provider = Arc::new(StubProvider::new(true, hello));
    let state = state_with(provider.clone());

    let reply = invoke(&state, ChatEvent::post(r#"{"message":"   "}"#)).await;

    assert_eq!(reply.status_code(), 200);
    assert_eq!(provider.calls()[0].1, "   ");
}

#[tokio::test]
async fn test_whitespace_only_message_gets_fallback_without_credential() {
    let state = state_with(Arc::new(StubProvider::new(false, hello)));

    let reply = invoke(&state, ChatEvent::post(r#"{"message":"   "}"#)).await;

    assert_eq!(reply.status_code(), 200);
    assert_eq!(body_json(&reply)["response"], DEFAULT_FALLBACK_REPLY);
}

#[tokio::test]
async fn test_upstream_status_is_reported_in_band() {
    fn unauthorized() -> Result<String, ProviderError> {
        Err(ProviderError::Status {
            status: 401,
            body: "invalid key".to_string(),
        })
    }

    let state = state_with(Arc::new(StubProvider::new(true, unauthorized)));
    let reply = invoke(&state, ChatEvent::post(r#"{"message":"hi"}"#)).await;

    assert_eq!(reply.status_code(), 200);
    assert_eq!(body_json(&reply)["response"], "⚠️ Ошибка API: 401");
    assert_eq!(state.metrics().outcome_count(Outcome::UpstreamWarning), 1);
    assert_eq!(state.metrics().upstream_failure_count("stub", "status"), 1);
}

#[tokio::test]
async fn test_unrecognized_upstream_body_is_reported_in_band() {
    fn odd() -> Result<String, ProviderError> {
        Err(ProviderError::UnrecognizedResponse {
            preview: r#"{"foo":"bar"}"#.to_string(),
        })
    }

    let state = state_with(Arc::new(StubProvider::new(true, odd)));
    let reply = invoke(&state, ChatEvent::post(r#"{"message":"hi"}"#)).await;

    assert_eq!(reply.status_code(), 200);
    assert_eq!(
        body_json(&reply)["response"],
        r#"🔍 Неожиданный ответ API: {"foo":"bar"}"#
    );
}

#[tokio::test]
async fn test_undecodable_upstream_body_is_server_error() {
    fn garbage() -> Result<String, ProviderError> {
        Err(ProviderError::from(
            serde_json::from_str::<serde_json::Value>("<html>").unwrap_err(),
        ))
    }

    let state = state_with(Arc::new(StubProvider::new(true, garbage)));
    let reply = invoke(&state, ChatEvent::post(r#"{"message":"hi"}"#)).await;

    assert_eq!(reply.status_code(), 500);
    assert_json_headers(&reply);
    let error = body_json(&reply)["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Server error: "), "got {}", error);
    assert_eq!(state.metrics().outcome_count(Outcome::ServerError), 1);
}
