//!
//! Upstream transport: talks to either a direct OpenAI-compatible endpoint
//! or the OAuth-backed Codex/ChatGPT backend, hiding the difference behind
//! one `send` surface.
//!
//! Handles payload rewriting for OAuth mode, the SSE request/response
//! plumbing (both directions), one-shot refresh-and-retry on a 401, and a
//! fallback payload-shrinking chain for LM Studio's partial Responses API
//! support.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use reqwest::{Response, StatusCode};
use serde_json::{Value, json};

use crate::auth::CodexAuthManager;
use crate::config::{Config, UpstreamMode};
use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

/// A boxed stream of parsed upstream SSE frames.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// Talks to the configured upstream on behalf of the request handlers.
///
/// One instance is built at startup and shared (via `Arc`) across requests;
/// it owns the `reqwest::Client` connection pool and, in OAuth mode, the
/// [`CodexAuthManager`].
pub struct UpstreamTransport {
    config: Arc<Config>,
    http: reqwest::Client,
    auth: Option<Arc<CodexAuthManager>>,
}

/* --- constants ------------------------------------------------------------------------------ */

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/* --- start of code -------------------------------------------------------------------------- */

impl UpstreamTransport {
    pub fn new(config: Arc<Config>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client must build with static configuration");

        let auth = match config.upstream_mode {
            UpstreamMode::Codex => Some(Arc::new(CodexAuthManager::new(
                config.expanded_codex_auth_path(),
                config.codex_refresh_token_url_override.clone(),
            ))),
            UpstreamMode::Openai => None,
        };

        Self { config, http, auth }
    }

    fn responses_url(&self) -> String {
        let base = match self.config.upstream_mode {
            UpstreamMode::Openai => self.config.openai_base_url.trim_end_matches('/'),
            UpstreamMode::Codex => self.config.codex_base_url.trim_end_matches('/'),
        };
        format!("{base}/responses")
    }

    async fn bearer_token(&self) -> Result<String> {
        match &self.auth {
            Some(manager) => Ok(manager.ensure_fresh().await?.access_token),
            None => self.config.openai_api_key.clone().ok_or_else(|| {
                ProxyError::Authentication("OPENAI_API_KEY is not configured".to_string())
            }),
        }
    }

    async fn refreshed_bearer_token(&self) -> Result<String> {
        match &self.auth {
            Some(manager) => Ok(manager.refresh_on_unauthorized().await?.access_token),
            None => Err(ProxyError::Authentication(
                "upstream rejected the configured API key".to_string(),
            )),
        }
    }

    /// Rewrites `payload` in place for the Codex OAuth backend: drops
    /// fields it rejects, forces `store`/`stream`, fills in a default
    /// `instructions`, and rewrites assistant `input_text` spans to
    /// `output_text` (the shape Codex expects for prior-turn assistant
    /// content).
    fn prepare_oauth_payload(&self, payload: &mut Value) {
        if let Some(obj) = payload.as_object_mut() {
            for field in ["max_output_tokens", "max_tokens", "max_tool_calls"] {
                obj.remove(field);
            }
            obj.insert("store".to_string(), json!(false));
            obj.insert("stream".to_string(), json!(true));

            let needs_default_instructions = obj
                .get("instructions")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().is_empty())
                .unwrap_or(true);
            if needs_default_instructions {
                obj.insert(
                    "instructions".to_string(),
                    json!(self.config.codex_default_instructions),
                );
            }
        }

        if let Some(input) = payload.get_mut("input").and_then(|v| v.as_array_mut()) {
            for item in input.iter_mut() {
                rewrite_assistant_spans_to_output_text(item);
            }
        }
    }

    /// Sends a request and returns the completed response body as a single
    /// JSON value, regardless of whether the upstream was driven in
    /// streaming or non-streaming mode underneath.
    pub async fn send_non_streaming(&self, mut payload: Value) -> Result<Value> {
        match self.config.upstream_mode {
            UpstreamMode::Openai => {
                set_stream_flag(&mut payload, false);
                self.send_non_streaming_openai(payload).await
            }
            UpstreamMode::Codex => {
                self.prepare_oauth_payload(&mut payload);
                let stream = self.send_streaming_with_retry(payload).await?;
                collect_completed_response(stream).await
            }
        }
    }

    /// Sends a request and returns a stream of parsed upstream SSE frames.
    pub async fn send_streaming(&self, mut payload: Value) -> Result<FrameStream> {
        set_stream_flag(&mut payload, true);
        if self.config.upstream_mode == UpstreamMode::Codex {
            self.prepare_oauth_payload(&mut payload);
        }
        self.send_streaming_with_retry(payload).await
    }

    async fn send_non_streaming_openai(&self, payload: Value) -> Result<Value> {
        let response = self.post_with_fallback_chain(payload).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::Transport(format!("upstream response was not JSON: {e}")))?;
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(ProxyError::Upstream {
                status: 502,
                payload: json!({ "error": error }),
            });
        }
        Ok(body)
    }

    async fn send_streaming_with_retry(&self, payload: Value) -> Result<FrameStream> {
        let response = self.post_streaming(payload.clone()).await;
        match response {
            Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                self.refreshed_bearer_token().await?;
                let retried = self.post_streaming(payload).await?;
                Ok(sse_value_stream(check_status(retried).await?))
            }
            Ok(resp) => Ok(sse_value_stream(check_status(resp).await?)),
            Err(e) => Err(e),
        }
    }

    async fn post_streaming(&self, payload: Value) -> Result<Response> {
        let token = self.bearer_token().await?;
        self.http
            .post(self.responses_url())
            .bearer_auth(token)
            .header("Accept", "text/event-stream")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProxyError::Transport(format!("upstream request failed: {e}")))
    }

    /// Posts a non-streaming request, retrying once on 401 (OAuth mode) and
    /// falling back through the LM Studio payload-shrinking chain on the
    /// `invalid_union`-on-`input` error LM Studio returns for request
    /// shapes its partial Responses API implementation can't parse.
    async fn post_with_fallback_chain(&self, payload: Value) -> Result<Response> {
        let response = self.post_once(payload.clone()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.auth.is_some() {
            self.refreshed_bearer_token().await?;
            return check_status(self.post_once(payload).await?).await;
        }

        if response.status() == StatusCode::BAD_REQUEST && is_lm_studio_endpoint(&self.config.openai_base_url)
        {
            let (status, body) = read_status_and_body(response).await;
            if is_invalid_input_union(&body) {
                let normalized = normalize_input_for_lm_studio(payload.clone());
                let retried = self.post_once(normalized).await?;
                if retried.status().is_success() {
                    return Ok(retried);
                }
                let collapsed = collapse_input_for_lm_studio(payload);
                return check_status(self.post_once(collapsed).await?).await;
            }
            return Err(ProxyError::Upstream { status: status.as_u16(), payload: body });
        }

        check_status(response).await
    }

    async fn post_once(&self, payload: Value) -> Result<Response> {
        let token = self.bearer_token().await?;
        self.http
            .post(self.responses_url())
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProxyError::Transport(format!("upstream request failed: {e}")))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let (status, body) = read_status_and_body(response).await;
    Err(ProxyError::Upstream { status: status.as_u16(), payload: body })
}

async fn read_status_and_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = response
        .text()
        .await
        .map(|text| serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text })))
        .unwrap_or(Value::Null);
    (status, body)
}

fn is_invalid_input_union(body: &Value) -> bool {
    let message = body
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let param = body.pointer("/error/param").and_then(|v| v.as_str()).unwrap_or_default();
    param.starts_with("input") && message.contains("invalid_union")
}

fn set_stream_flag(payload: &mut Value, streaming: bool) {
    if let Some(obj) = payload.as_object_mut() {
        obj.insert("stream".to_string(), json!(streaming));
    }
}

/// Whether `base_url` looks like a local LM Studio server: loopback host on
/// port 1234, LM Studio's default.
fn is_lm_studio_endpoint(base_url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(base_url) else { return false };
    let is_loopback = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("::1"));
    is_loopback && url.port() == Some(1234)
}

/// First fallback: collapse every content span to `input_text` and every
/// item's role to `user`, prefixing non-user text with a capitalized
/// `Role: ` marker so turn boundaries survive flattening.
fn normalize_input_for_lm_studio(mut payload: Value) -> Value {
    if let Some(input) = payload.get_mut("input").and_then(|v| v.as_array_mut()) {
        for item in input.iter_mut() {
            let role = item.get("role").and_then(|v| v.as_str()).unwrap_or("user").to_string();
            if let Some(content) = item.get_mut("content").and_then(|v| v.as_array_mut()) {
                for span in content.iter_mut() {
                    if let Some(span_obj) = span.as_object_mut() {
                        span_obj.insert("type".to_string(), json!("input_text"));
                        if role != "user" {
                            if let Some(text) = span_obj.get("text").and_then(|v| v.as_str()) {
                                let prefixed = format!("{}: {text}", capitalize(&role));
                                span_obj.insert("text".to_string(), json!(prefixed));
                            }
                        }
                    }
                }
            }
            if let Some(obj) = item.as_object_mut() {
                obj.insert("role".to_string(), json!("user"));
            }
        }
    }
    payload
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Second, more aggressive fallback: concatenate the entire conversation
/// into one `user` message LM Studio is guaranteed to accept.
fn collapse_input_for_lm_studio(mut payload: Value) -> Value {
    let mut lines = Vec::new();
    if let Some(input) = payload.get("input").and_then(|v| v.as_array()) {
        for item in input {
            let role = item.get("role").and_then(|v| v.as_str()).unwrap_or("user");
            if let Some(content) = item.get("content").and_then(|v| v.as_array()) {
                for span in content {
                    if let Some(text) = span.get("text").and_then(|v| v.as_str()) {
                        lines.push(format!("{role}: {text}"));
                    }
                }
            }
        }
    }
    let collapsed = lines.join("\n\n");

    if let Some(obj) = payload.as_object_mut() {
        obj.insert(
            "input".to_string(),
            json!([{
                "type": "message",
                "role": "user",
                "content": [{"type": "input_text", "text": collapsed}],
            }]),
        );
    }
    payload
}

fn rewrite_assistant_spans_to_output_text(item: &mut Value) {
    let is_assistant = item.get("role").and_then(|v| v.as_str()) == Some("assistant");
    if !is_assistant {
        return;
    }
    if let Some(content) = item.get_mut("content").and_then(|v| v.as_array_mut()) {
        for span in content.iter_mut() {
            if span.get("type").and_then(|v| v.as_str()) == Some("input_text") {
                if let Some(span_obj) = span.as_object_mut() {
                    span_obj.insert("type".to_string(), json!("output_text"));
                }
            }
        }
    }
}

/* --- SSE framing -------------------------------------------------------------------------------- */

struct SseReaderState {
    response: Response,
    buffer: String,
    done: bool,
}

/// Parses `response`'s body as a standard `event:`/`data:` SSE stream and
/// yields each frame's `data:` payload, parsed as JSON. A `data: [DONE]`
/// sentinel is swallowed rather than yielded. A non-JSON payload is wrapped
/// so the translator's unknown-type catch-all silently passes over it
/// instead of the stream erroring out.
fn sse_value_stream(response: Response) -> FrameStream {
    Box::pin(futures::stream::unfold(
        SseReaderState { response, buffer: String::new(), done: false },
        |mut state| async move {
            loop {
                if let Some(frame) = take_next_frame(&mut state.buffer) {
                    match parse_frame_data(&frame) {
                        Some(value) => return Some((Ok(value), state)),
                        None => continue,
                    }
                }

                if state.done {
                    return None;
                }

                match state.response.chunk().await {
                    Ok(Some(bytes)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Ok(None) => state.done = true,
                    Err(e) => {
                        return Some((
                            Err(ProxyError::Transport(format!("upstream stream read failed: {e}"))),
                            state,
                        ));
                    }
                }
            }
        },
    ))
}

/// Pulls the next blank-line-terminated frame off the front of `buffer`, if
/// a complete one is available.
fn take_next_frame(buffer: &mut String) -> Option<String> {
    let separator = buffer.find("\n\n").or_else(|| buffer.find("\r\n\r\n"))?;
    let rest = buffer.split_off(separator);
    let frame = std::mem::replace(buffer, rest.trim_start_matches(['\n', '\r']).to_string());
    Some(frame)
}

/// Extracts and parses the `data:` field(s) of one SSE frame. Returns
/// `None` for the `[DONE]` sentinel or a frame carrying no data at all.
fn parse_frame_data(frame: &str) -> Option<Value> {
    let mut data = String::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(_) => Some(json!({ "type": "_raw", "raw": data })),
    }
}

/// Drains a streaming response looking for the `response.completed` frame
/// and returns its `response` object, for callers that want a single
/// buffered result out of what OAuth mode forces to be a streaming call.
async fn collect_completed_response(mut stream: FrameStream) -> Result<Value> {
    use futures::StreamExt;

    while let Some(frame) = stream.next().await {
        let frame = frame?;
        let frame_type = frame.get("type").and_then(|v| v.as_str()).unwrap_or("");
        match frame_type {
            "response.completed" => {
                return Ok(frame.get("response").cloned().unwrap_or(Value::Null));
            }
            "response.failed" | "error" => {
                return Err(ProxyError::Upstream {
                    status: 502,
                    payload: frame.get("response").cloned().unwrap_or(frame),
                });
            }
            _ => {}
        }
    }
    Err(ProxyError::Transport("upstream stream ended without a completed response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lm_studio_endpoint_is_detected_by_loopback_and_port() {
        assert!(is_lm_studio_endpoint("http://127.0.0.1:1234/v1"));
        assert!(is_lm_studio_endpoint("http://localhost:1234"));
        assert!(!is_lm_studio_endpoint("https://api.openai.com/v1"));
        assert!(!is_lm_studio_endpoint("http://127.0.0.1:8080/v1"));
    }

    #[test]
    fn invalid_input_union_is_recognized() {
        let body = json!({"error": {"param": "input.0.content", "message": "invalid_union variant"}});
        assert!(is_invalid_input_union(&body));
        let other = json!({"error": {"param": "model", "message": "invalid_union variant"}});
        assert!(!is_invalid_input_union(&other));
    }

    #[test]
    fn take_next_frame_splits_on_blank_line() {
        let mut buffer = "event: message\ndata: {\"a\":1}\n\nevent: next".to_string();
        let frame = take_next_frame(&mut buffer).unwrap();
        assert_eq!(frame, "event: message\ndata: {\"a\":1}");
        assert_eq!(buffer, "event: next");
    }

    #[test]
    fn parse_frame_data_skips_done_sentinel() {
        assert!(parse_frame_data("data: [DONE]").is_none());
        assert!(parse_frame_data("event: ping").is_none());
    }

    #[test]
    fn parse_frame_data_parses_json_payload() {
        let value = parse_frame_data("event: response.created\ndata: {\"type\":\"response.created\"}").unwrap();
        assert_eq!(value["type"], json!("response.created"));
    }

    #[test]
    fn oauth_rewrite_converts_assistant_input_text_to_output_text() {
        let mut item = json!({
            "role": "assistant",
            "content": [{"type": "input_text", "text": "hi"}],
        });
        rewrite_assistant_spans_to_output_text(&mut item);
        assert_eq!(item["content"][0]["type"], json!("output_text"));
    }

    #[test]
    fn normalize_forces_every_item_role_to_user() {
        let payload = json!({
            "input": [
                {"role": "user", "content": [{"type": "input_text", "text": "hi"}]},
                {"role": "assistant", "content": [{"type": "input_text", "text": "hello"}]},
            ],
        });
        let normalized = normalize_input_for_lm_studio(payload);
        let input = normalized["input"].as_array().unwrap();
        assert_eq!(input[0]["role"], json!("user"));
        assert_eq!(input[1]["role"], json!("user"));
    }

    #[test]
    fn normalize_only_prefixes_non_user_content() {
        let payload = json!({
            "input": [
                {"role": "user", "content": [{"type": "input_text", "text": "hi"}]},
                {"role": "assistant", "content": [{"type": "input_text", "text": "hello"}]},
            ],
        });
        let normalized = normalize_input_for_lm_studio(payload);
        let input = normalized["input"].as_array().unwrap();
        assert_eq!(input[0]["content"][0]["text"], json!("hi"));
        assert_eq!(input[1]["content"][0]["text"], json!("Assistant: hello"));
    }
}
