//! End-to-end tests: relay router -> reqwest upstream -> wiremock provider.
//!
//! Provider policies are pointed at a local mock server so the full request
//! path, including the real HTTP client, is exercised without network access.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use http::{Request, StatusCode};
use tower::ServiceExt;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use llm_relay::config::ApiKey;
use llm_relay::provider::{ProviderKind, ProviderPolicy};
use llm_relay::proxy::{create_router, AppState, HttpUpstream, ProviderRoute};

fn app_for(kind: ProviderKind, upstream_url: String) -> axum::Router {
    let route = ProviderRoute::new(
        ProviderPolicy::for_kind(kind).with_upstream_url(upstream_url),
        Some(ApiKey::from("sk-server")),
        false,
    );
    let upstream = HttpUpstream::with_timeout(Some(Duration::from_secs(5))).unwrap();
    create_router(AppState {
        routes: vec![route],
        upstream: Arc::new(upstream),
        max_body_bytes: 1_048_576,
    })
}

async fn parse_body(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn test_openai_round_trip() {
    let server = MockServer::start().await;
    let payload = serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "ping"}]
    });
    let reply = serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}}]
    });

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-server"))
        .and(header("content-type", "application/json"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200).set_body_json(&reply))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(
        ProviderKind::OpenAi,
        format!("{}/v1/chat/completions", server.uri()),
    );
    let request = Request::post("/llm/openai/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, json) = parse_body(app.oneshot(request).await.unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, reply);
}

#[tokio::test]
async fn test_anthropic_round_trip_with_version() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-server"))
        .and(header("anthropic-version", "2024-01-01"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "msg_1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(
        ProviderKind::Anthropic,
        format!("{}/v1/messages", server.uri()),
    );
    let request = Request::post("/proxy/anthropic/v1/messages")
        .header("anthropic-version", "2024-01-01")
        .body(Body::from(r#"{"model":"claude-3-5-sonnet","max_tokens":8}"#))
        .unwrap();
    let (status, json) = parse_body(app.oneshot(request).await.unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "msg_1");
}

#[tokio::test]
async fn test_upstream_error_relayed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let app = app_for(ProviderKind::Anthropic, server.uri());
    let request = Request::post("/proxy/anthropic/v1/messages")
        .body(Body::from("{}"))
        .unwrap();
    let (status, json) = parse_body(app.oneshot(request).await.unwrap()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, serde_json::json!({"error": "invalid x-api-key"}));
}

#[tokio::test]
async fn test_unreachable_upstream_is_500() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let app = app_for(
        ProviderKind::OpenAi,
        format!("http://127.0.0.1:{}/v1/chat/completions", port),
    );
    let request = Request::post("/llm/openai/chat/completions")
        .body(Body::from("{}"))
        .unwrap();
    let (status, json) = parse_body(app.oneshot(request).await.unwrap()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, serde_json::json!({"error": "Internal Server Error"}));
}
