//!
//! HTTP server setup and route handlers.
//!
//! Wires the Anthropic-facing routes onto the translation core: request
//! mapping (C1), upstream transport (C2), stream translation (C3), and
//! response mapping/token counting (C4). One `AppState` per process, shared
//! read-only across connections; per the concurrency model, nothing else is
//! shared between requests.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response, Sse};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::config::Config;
use crate::converter::openai_to_anthropic::normalize_openai_usage;
use crate::converter::{AnthropicToOpenAiConverter, OpenAiToAnthropicConverter};
use crate::error::{ProxyError, Result};
use crate::logging;
use crate::stream::{StreamState, translate_openai_event};
use crate::token_counter::count_openai_request_tokens;
use crate::transport::{FrameStream, UpstreamTransport};
use crate::types::MessagesRequest;

/* --- types ----------------------------------------------------------------------------------- */

/// Shared, read-only application state. Built once at startup and handed to
/// every handler behind an `Arc`.
pub struct AppState {
    pub config: Config,
    pub transport: UpstreamTransport,
}

/* --- start of code -------------------------------------------------------------------------- */

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let shared_config = Arc::new(config.clone());
        let transport = UpstreamTransport::new(shared_config);
        Ok(Self { config, transport })
    }

    fn converter(&self) -> AnthropicToOpenAiConverter<'_> {
        AnthropicToOpenAiConverter::new(&self.config.model_map, &self.config.default_model)
    }
}

pub async fn health() -> &'static str {
    "ok"
}

/// `POST /v1/messages`. Dispatches to the streaming path when the request
/// body sets `stream: true`, otherwise returns a buffered Anthropic message.
pub async fn messages(State(state): State<Arc<AppState>>, Json(request): Json<MessagesRequest>) -> Response {
    if request.stream == Some(true) {
        return messages_stream_response(state, request).await;
    }
    messages_non_streaming(state, request).await
}

/// `POST /v1/messages/stream`. Always responds with an Anthropic SSE event
/// stream, regardless of the body's `stream` field.
pub async fn messages_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MessagesRequest>,
) -> Response {
    messages_stream_response(state, request).await
}

/// `POST /v1/messages/count_tokens` and its alias `/v1/messages/token_count`.
pub async fn count_tokens(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MessagesRequest>,
) -> Response {
    match state.converter().convert(&request) {
        Ok(payload) => Json(json!({ "input_tokens": count_openai_request_tokens(&payload) })).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn messages_non_streaming(state: Arc<AppState>, request: MessagesRequest) -> Response {
    let request_id = Uuid::new_v4().simple().to_string();
    logging::log_request(
        &request_id,
        &request.model,
        &json!({"model": request.model, "messages": request.messages.len()}),
    );

    let outcome: Result<Value> = async {
        let payload = state.converter().convert(&request)?;
        let response = state.transport.send_non_streaming(payload).await?;
        OpenAiToAnthropicConverter::new().map_response(&response)
    }
    .await;

    match outcome {
        Ok(body) => {
            logging::log_response(&request_id, 200, &body);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            logging::log_error(&request_id, err.status_code(), &err.to_string());
            error_response(&err)
        }
    }
}

async fn messages_stream_response(state: Arc<AppState>, request: MessagesRequest) -> Response {
    let request_id = Uuid::new_v4().simple().to_string();
    logging::log_request(
        &request_id,
        &request.model,
        &json!({"model": request.model, "messages": request.messages.len(), "streaming": true}),
    );

    let payload = match state.converter().convert(&request) {
        Ok(payload) => payload,
        Err(err) => {
            logging::log_error(&request_id, err.status_code(), &err.to_string());
            return error_response(&err);
        }
    };

    let precomputed_tokens = count_openai_request_tokens(&payload);
    let initial_usage = normalize_openai_usage(&json!({"input_tokens": precomputed_tokens, "output_tokens": 0}));

    let upstream = match state.transport.send_streaming(payload).await {
        Ok(stream) => stream,
        Err(err) => {
            logging::log_error(&request_id, err.status_code(), &err.to_string());
            return error_response(&err);
        }
    };

    let receiver = spawn_translation_task(upstream, request.model.clone(), initial_usage, request_id);
    Sse::new(ReceiverStream::new(receiver)).into_response()
}

/// Spawns the per-connection translation task: drains the upstream frame
/// stream through [`translate_openai_event`] and forwards each formatted
/// Anthropic SSE frame to `tx`. Dropping the receiver (client disconnect)
/// cancels this task, which stops reading upstream without emitting
/// `message_stop`, per the concurrency model's cancellation rule.
fn spawn_translation_task(
    mut upstream: FrameStream,
    model: String,
    initial_usage: Value,
    request_id: String,
) -> mpsc::Receiver<std::result::Result<Event, std::convert::Infallible>> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut state = StreamState::new(model, initial_usage);

        while let Some(frame) = upstream.next().await {
            match frame {
                Ok(frame) => {
                    for (event_name, payload) in translate_openai_event(&mut state, &frame) {
                        logging::log_response(&request_id, 200, &payload);
                        if let Ok(data) = serde_json::to_string(&payload) {
                            if tx.send(Ok(Event::default().event(event_name).data(data))).await.is_err() {
                                return; // client disconnected
                            }
                        }
                    }
                }
                Err(err) => {
                    logging::log_error(&request_id, err.status_code(), &err.to_string());
                    let envelope = err.to_anthropic_envelope();
                    if let Ok(data) = serde_json::to_string(&envelope) {
                        let _ = tx.send(Ok(Event::default().event("error").data(data))).await;
                    }
                    return;
                }
            }
        }
    });

    rx
}

fn error_response(err: &ProxyError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_anthropic_envelope())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_maps_invalid_request_to_400() {
        let err = ProxyError::InvalidRequest("bad field".to_string());
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
