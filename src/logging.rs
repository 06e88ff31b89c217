//!
//! Structured request/response logging and payload redaction.
//!
//! A deliberately small stand-in for the reference implementation's
//! dedicated redaction engine: logging is gated behind `OBS_LOG_ENABLED`,
//! and `OBS_LOG_ALL` controls whether payload bodies are logged verbatim or
//! redacted down to a shape-only summary.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::env;
use std::sync::OnceLock;

use serde_json::Value;

/* --- start of code -------------------------------------------------------------------------- */

/// Whether request/response logging is enabled at all.
pub fn log_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| env_flag("OBS_LOG_ENABLED"))
}

/// Whether logged payloads should include full bodies rather than redacted
/// summaries.
pub fn log_all() -> bool {
    static ALL: OnceLock<bool> = OnceLock::new();
    *ALL.get_or_init(|| env_flag("OBS_LOG_ALL"))
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Logs an incoming request body under `tracing::info!`, honoring
/// [`log_enabled`]/[`log_all`].
pub fn log_request(request_id: &str, model: &str, body: &Value) {
    if !log_enabled() {
        return;
    }
    if log_all() {
        tracing::info!(target: "anthromux::request", request_id, model, body = %body, "inbound request");
    } else {
        tracing::info!(target: "anthromux::request", request_id, model, payload = %redact(body), "inbound request");
    }
}

/// Logs a completed response body under `tracing::info!`.
pub fn log_response(request_id: &str, status: u16, body: &Value) {
    if !log_enabled() {
        return;
    }
    if log_all() {
        tracing::info!(target: "anthromux::response", request_id, status, body = %body, "outbound response");
    } else {
        tracing::info!(target: "anthromux::response", request_id, status, payload = %redact(body), "outbound response");
    }
}

/// Logs an error under `tracing::warn!`. Errors are always logged when
/// logging is enabled, regardless of [`log_all`]; only success-path bodies
/// are subject to the verbose/redacted split.
pub fn log_error(request_id: &str, status: u16, message: &str) {
    if !log_enabled() {
        return;
    }
    tracing::warn!(target: "anthromux::error", request_id, status, message, "request failed");
}

/// Collapses `value` down to a shape-only summary: object keys and array
/// lengths survive, scalar leaves are replaced by their type name. Good
/// enough to see request structure in logs without leaking message content.
fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map.iter().map(|(k, v)| (k.clone(), redact(v))).collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::String(format!("<array:{}>", items.len())),
        Value::String(_) => Value::String("<string>".to_string()),
        Value::Number(_) => Value::String("<number>".to_string()),
        Value::Bool(_) => Value::String("<bool>".to_string()),
        Value::Null => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redact_keeps_object_keys_and_array_lengths() {
        let original = json!({"messages": [{"role": "user", "content": "secret"}], "model": "gpt-5.2"});
        let redacted = redact(&original);
        assert_eq!(redacted["messages"], json!("<array:1>"));
        assert_eq!(redacted["model"], json!("<string>"));
    }
}
