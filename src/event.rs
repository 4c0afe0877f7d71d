//! Serverless event and reply shapes
//!
//! A [`ChatEvent`] is what a function runtime hands to the relay for one
//! invocation (`{"httpMethod": ..., "body": ...}`), and a [`ChatReply`] is what
//! it gets back (`{"statusCode": ..., "headers": {...}, "body": ...}`). The HTTP
//! server converts real requests into events so both surfaces share one
//! contract.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
pub const MAX_AGE: &str = "Access-Control-Max-Age";

/// Body used when the event carries none
const EMPTY_BODY: &str = "{}";

fn default_http_method() -> String {
    "GET".to_string()
}

/// One inbound invocation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatEvent {
    #[serde(rename = "httpMethod", default = "default_http_method")]
    http_method: String,
    #[serde(default)]
    body: Option<String>,
}

impl ChatEvent {
    pub fn new(http_method: impl Into<String>, body: Option<String>) -> Self {
        Self {
            http_method: http_method.into(),
            body,
        }
    }

    /// Shorthand for a POST event carrying `body`
    pub fn post(body: impl Into<String>) -> Self {
        Self::new("POST", Some(body.into()))
    }

    pub fn http_method(&self) -> &str {
        &self.http_method
    }

    /// Raw body, with a missing body read as an empty JSON object
    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or(EMPTY_BODY)
    }
}

/// One outbound reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatReply {
    #[serde(rename = "statusCode")]
    status_code: u16,
    headers: BTreeMap<String, String>,
    body: String,
    #[serde(rename = "isBase64Encoded", default)]
    is_base64_encoded: bool,
}

impl ChatReply {
    /// Reply to a browser CORS preflight: empty body, allow-* headers only
    pub fn preflight() -> Self {
        let headers = [
            (ALLOW_ORIGIN, "*"),
            (ALLOW_METHODS, "POST, OPTIONS"),
            (ALLOW_HEADERS, "Content-Type"),
            (MAX_AGE, "86400"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            status_code: StatusCode::OK.as_u16(),
            headers,
            body: String::new(),
            is_base64_encoded: false,
        }
    }

    /// JSON reply carrying the JSON and CORS headers every non-preflight reply has
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let headers = [(CONTENT_TYPE, "application/json"), (ALLOW_ORIGIN, "*")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            status_code: status.as_u16(),
            headers,
            body: value.to_string(),
            is_base64_encoded: false,
        }
    }

    /// `200 {"response": text}`
    pub fn completion(text: &str) -> Self {
        Self::json(StatusCode::OK, &serde_json::json!({ "response": text }))
    }

    /// `<status> {"error": message}`
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Look up a header by exact name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl IntoResponse for ChatReply {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (status, Body::from(self.body)).into_response();
        let response_headers = response.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    response_headers.insert(name, value);
                }
                _ => {
                    tracing::warn!(header = %name, "Dropping reply header that is not valid HTTP");
                }
            }
        }

        response
    }
}
