//! Upstream transport scenario tests, covering `spec.md` §8's E5 (LM Studio
//! fallback chain) and E6 (OAuth 401 refresh-retry) end-to-end scenarios
//! against a mocked upstream.

use std::net::TcpListener;
use std::sync::Arc;

use anthromux::Config;
use anthromux::transport::UpstreamTransport;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn openai_config(base_url: &str) -> Config {
    temp_env::with_vars(
        vec![
            ("OPENAI_UPSTREAM_MODE", Some("openai")),
            ("OPENAI_API_KEY", Some("sk-test")),
            ("OPENAI_BASE_URL", Some(base_url)),
        ],
        || Config::from_env().unwrap(),
    )
}

fn sample_payload() -> Value {
    json!({
        "model": "gpt-5.2",
        "input": [{"type": "message", "role": "user", "content": [{"type": "input_text", "text": "hi"}]}],
    })
}

/// Two turns, so "normalize" (which rewrites spans per-item, keeping the item
/// count) stays distinguishable from "collapse" (which always flattens to a
/// single item), letting the mock responder tell the three attempts apart.
fn multi_turn_payload() -> Value {
    json!({
        "model": "gpt-5.2",
        "input": [
            {"type": "message", "role": "user", "content": [{"type": "input_text", "text": "hi"}]},
            {"type": "message", "role": "assistant", "content": [{"type": "input_text", "text": "hello"}]},
        ],
    })
}

/// E5 — direct-mode upstream rejects the Responses `input` union shape the
/// way LM Studio does (400, `param` under `input`, message mentioning
/// `invalid_union`); the transport retries with the "normalize" payload and,
/// when that also fails, the "collapse" payload, succeeding on the third try.
#[tokio::test]
async fn lm_studio_fallback_chain_retries_until_collapsed_payload_succeeds() {
    let listener = TcpListener::bind("127.0.0.1:1234").expect("port 1234 must be free for this test");
    let server = MockServer::builder().listener(listener).start().await;

    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(move |req: &Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
            let input = body.get("input").and_then(|v| v.as_array());
            // Only the "collapse" fallback flattens the two-turn history down
            // to a single `user` item; the original and "normalize" payloads
            // both keep two items.
            let is_collapsed = input
                .map(|items| items.len() == 1)
                .unwrap_or(false)
                && input
                    .and_then(|items| items.first())
                    .and_then(|item| item.get("content"))
                    .and_then(|c| c.as_array())
                    .and_then(|spans| spans.first())
                    .and_then(|span| span.get("text"))
                    .and_then(|t| t.as_str())
                    .map(|t| t.contains("user: hi") && t.contains("assistant: hello"))
                    .unwrap_or(false);

            if is_collapsed {
                ResponseTemplate::new(200).set_body_json(json!({
                    "status": "completed",
                    "output": [],
                    "usage": {"input_tokens": 1, "output_tokens": 1},
                }))
            } else {
                ResponseTemplate::new(400).set_body_json(json!({
                    "error": {"param": "input.0.content", "message": "invalid_union variant", "code": "invalid_union"}
                }))
            }
        })
        .mount(&server)
        .await;

    let config = openai_config("http://127.0.0.1:1234/v1").await;
    let transport = UpstreamTransport::new(Arc::new(config));

    let result = transport.send_non_streaming(multi_turn_payload()).await;
    assert!(result.is_ok(), "expected the collapsed retry to succeed, got {result:?}");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3, "original, normalized, and collapsed payloads must each be tried once");
}

async fn codex_config(base_url: &str, auth_path: &str, refresh_url: &str) -> Config {
    temp_env::with_vars(
        vec![
            ("OPENAI_UPSTREAM_MODE", Some("codex")),
            ("CODEX_BASE_URL", Some(base_url)),
            ("CODEX_AUTH_PATH", Some(auth_path)),
            ("CODEX_REFRESH_TOKEN_URL_OVERRIDE", Some(refresh_url)),
        ],
        || Config::from_env().unwrap(),
    )
}

/// E6 — OAuth mode, upstream returns 401 once; the transport refreshes the
/// credential exactly once and retries, and the on-disk credential file is
/// atomically updated with the refreshed tokens and a new `last_refresh`.
#[tokio::test]
async fn oauth_401_triggers_exactly_one_refresh_and_retry() {
    let upstream = MockServer::start().await;
    let oauth = MockServer::start().await;

    let call_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let call_count_clone = call_count.clone();
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(move |_req: &Request| {
            let n = call_count_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "expired"}}))
            } else {
                let frame = "event: response.completed\ndata: {\"type\":\"response.completed\",\"response\":{\"status\":\"completed\",\"output\":[],\"usage\":{\"input_tokens\":1,\"output_tokens\":1}}}\n\n";
                ResponseTemplate::new(200)
                    .append_header("content-type", "text/event-stream")
                    .set_body_raw(frame.as_bytes().to_vec(), "text/event-stream")
            }
        })
        .mount(&upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access-token",
            "refresh_token": "new-refresh-token",
        })))
        .mount(&oauth)
        .await;

    // Recent enough that `ensure_fresh`'s proactive 8-day refresh does not
    // fire on its own — only the 401-triggered refresh should hit the
    // endpoint, keeping the "exactly once" assertion meaningful.
    let recent_last_refresh = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();

    let dir = tempfile::tempdir().unwrap();
    let auth_path = dir.path().join("auth.json");
    std::fs::write(
        &auth_path,
        serde_json::to_vec(&json!({
            "tokens": {"access_token": "old-access-token", "refresh_token": "old-refresh-token"},
            "last_refresh": recent_last_refresh,
        }))
        .unwrap(),
    )
    .unwrap();

    let config = codex_config(
        &upstream.uri(),
        auth_path.to_str().unwrap(),
        &format!("{}/oauth/token", oauth.uri()),
    )
    .await;
    let transport = UpstreamTransport::new(Arc::new(config));

    let result = transport.send_non_streaming(sample_payload()).await;
    assert!(result.is_ok(), "expected the refresh-and-retry to succeed, got {result:?}");

    let oauth_requests = oauth.received_requests().await.unwrap();
    assert_eq!(oauth_requests.len(), 1, "refresh endpoint must be called exactly once");

    let upstream_requests = upstream.received_requests().await.unwrap();
    assert_eq!(upstream_requests.len(), 2, "original 401 plus one retry");

    let updated: Value = serde_json::from_slice(&std::fs::read(&auth_path).unwrap()).unwrap();
    assert_eq!(updated["tokens"]["access_token"], json!("new-access-token"));
    assert_ne!(updated["last_refresh"], json!(recent_last_refresh));
}
