//! End-to-end HTTP tests against a mocked upstream.
//!
//! Drives the full Axum router built by `create_app` with `tower::ServiceExt`,
//! standing in for a live OpenAI-compatible server with `wiremock`.

use anthromux::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn test_config(base_url: &str) -> Config {
    temp_env::with_vars(
        vec![
            ("OPENAI_UPSTREAM_MODE", Some("openai")),
            ("OPENAI_API_KEY", Some("sk-test")),
            ("OPENAI_BASE_URL", Some(base_url)),
        ],
        || Config::from_env().unwrap(),
    )
}

fn messages_body() -> Value {
    json!({
        "model": "claude-3-opus",
        "messages": [{"role": "user", "content": "Hi"}],
    })
}

async fn post(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_endpoint_responds_ok() {
    let server = MockServer::start().await;
    let config = test_config(&server.uri()).await;
    let app = anthromux::create_app(config).await.unwrap();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// E4 — non-streaming response mapping and usage normalization.
#[tokio::test]
async fn non_streaming_message_maps_output_and_normalizes_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "output": [{
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": "Hello", "annotations": []}],
            }],
            "usage": {"input_tokens": 100, "output_tokens": 5, "input_tokens_details": {"cached_tokens": 80}},
        })))
        .mount(&server)
        .await;

    let config = test_config(&server.uri()).await;
    let app = anthromux::create_app(config).await.unwrap();

    let (status, body) = post(app, "/v1/messages", messages_body()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"][0]["text"], json!("Hello"));
    assert_eq!(body["stop_reason"], json!("end_turn"));
    assert_eq!(body["usage"]["cache_read_input_tokens"], json!(80));
    assert_eq!(body["usage"]["input_tokens"], json!(20));
    assert_eq!(body["usage"]["output_tokens"], json!(5));
    assert_eq!(body["usage"]["cache_creation_input_tokens"], json!(0));
}

#[tokio::test]
async fn upstream_error_is_surfaced_as_anthropic_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"type": "rate_limit_error", "message": "slow down"}
        })))
        .mount(&server)
        .await;

    let config = test_config(&server.uri()).await;
    let app = anthromux::create_app(config).await.unwrap();

    let (status, body) = post(app, "/v1/messages", messages_body()).await;
    assert_eq!(status, StatusCode::from_u16(429).unwrap());
    assert_eq!(body["type"], json!("error"));
    assert_eq!(body["error"]["type"], json!("rate_limit_error"));
}

#[tokio::test]
async fn count_tokens_endpoint_and_its_alias_agree() {
    let server = MockServer::start().await;
    let config = test_config(&server.uri()).await;

    let app_primary = anthromux::create_app(config.clone()).await.unwrap();
    let (status, primary) = post(app_primary, "/v1/messages/count_tokens", messages_body()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(primary["input_tokens"].as_u64().unwrap() > 0);

    let app_alias = anthromux::create_app(config).await.unwrap();
    let (status, alias) = post(app_alias, "/v1/messages/token_count", messages_body()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alias, primary);
}
