//!
//! Error handling for the Anthropic-to-OpenAI translating proxy.
//!
//! Defines all error types used throughout the application using thiserror
//! for ergonomic error handling, plus the mapping from an internal error into
//! the Anthropic wire error envelope every HTTP response (and mid-stream
//! `event: error` frame) carries.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Value, json};
use thiserror::Error;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application error types following Rust best practices.
///
/// Each variant corresponds to one entry in the error taxonomy: the payload a
/// client sent was rejected by mapping/schema (`InvalidRequest`), credentials
/// were missing or could not be refreshed (`Authentication`), the upstream
/// itself returned a non-2xx response (`Upstream`), the client disconnected
/// mid-stream (`StreamCancelled`), a network or non-JSON-upstream failure
/// occurred (`Transport`), or configuration failed to parse at startup
/// (`Config`). The remaining variants wrap library errors so `?` works at
/// call sites that aren't yet classified into the taxonomy above.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("upstream error (status {status}): {payload}")]
    Upstream { status: u16, payload: Value },

    #[error("stream cancelled by client")]
    StreamCancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

/* --- start of code -------------------------------------------------------------------------- */

/// Result type alias for cleaner error handling throughout the application.
pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    /// The HTTP status code this error should be reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::InvalidRequest(_) => 400,
            ProxyError::Authentication(_) => 401,
            ProxyError::Upstream { status, .. } => *status,
            ProxyError::StreamCancelled => 499,
            ProxyError::Transport(_) => 502,
            ProxyError::Config(_) => 500,
            ProxyError::Serialization(_) => 400,
            ProxyError::Request(_) => 502,
        }
    }

    /// The Anthropic error `type` string for this error.
    pub fn anthropic_type(&self) -> String {
        match self {
            ProxyError::InvalidRequest(_) => "invalid_request_error".to_string(),
            ProxyError::Authentication(_) => "authentication_error".to_string(),
            ProxyError::Upstream { payload, .. } => map_openai_error_type(payload, "api_error"),
            ProxyError::StreamCancelled => "api_error".to_string(),
            ProxyError::Transport(_) => "api_error".to_string(),
            ProxyError::Config(_) => "api_error".to_string(),
            ProxyError::Serialization(_) => "invalid_request_error".to_string(),
            ProxyError::Request(_) => "api_error".to_string(),
        }
    }

    /// Build the Anthropic wire error envelope for this error.
    pub fn to_anthropic_envelope(&self) -> Value {
        let openai = match self {
            ProxyError::Upstream { payload, .. } => payload.clone(),
            _ => Value::Null,
        };
        build_anthropic_error(&self.anthropic_type(), &self.to_string(), None, None, openai)
    }
}

/// Extracts the `error.type` field from an upstream OpenAI-shaped error
/// payload, falling back to `default` when absent.
///
/// Grounded on the reference implementation's `map_openai_error_type`.
pub fn map_openai_error_type(openai_error: &Value, default: &str) -> String {
    openai_error
        .get("error")
        .and_then(|e| e.get("type"))
        .and_then(|t| t.as_str())
        .unwrap_or(default)
        .to_string()
}

/// Builds the Anthropic error envelope:
/// `{"type":"error","error":{"type","message","param","code","openai"}}`.
pub fn build_anthropic_error(
    error_type: &str,
    message: &str,
    param: Option<&str>,
    code: Option<&str>,
    openai_error: Value,
) -> Value {
    json!({
        "type": "error",
        "error": {
            "type": error_type,
            "message": message,
            "param": param,
            "code": code,
            "openai": if openai_error.is_null() { Value::Null } else { openai_error },
        }
    })
}
