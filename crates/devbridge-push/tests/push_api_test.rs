//! Token API and dispatcher scenarios against a mocked push relay

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use devbridge_proto::{Notification, NotificationData, Platform};
use devbridge_push::{api, PushDispatcher, RelayClient, TokenStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    app: Router,
    dispatcher: Arc<PushDispatcher>,
    _dir: TempDir,
}

fn harness(relay: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("push-tokens.json"));
    let dispatcher = Arc::new(PushDispatcher::new(store, RelayClient::new(relay)));
    Harness {
        app: api::with_cors(api::router(dispatcher.clone())),
        dispatcher,
        _dir: dir,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("origin", "https://app.example")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn session_complete() -> Notification {
    Notification {
        title: "✅ Session Complete".to_string(),
        body: "Task completed".to_string(),
        data: NotificationData {
            event_type: "session.completed".to_string(),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_register_count_unregister() {
    let h = harness("http://127.0.0.1:9/unused");

    let (status, body) = call(
        &h.app,
        "POST",
        "/push-token",
        Some(json!({"token": "ExponentPushToken[a]", "platform": "android", "deviceId": "d1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    // Rotation replaces the entry instead of adding one.
    call(
        &h.app,
        "POST",
        "/push-token",
        Some(json!({"token": "ExponentPushToken[b]", "deviceId": "d1"})),
    )
    .await;

    let (_, body) = call(&h.app, "GET", "/push-token", None).await;
    assert_eq!(body, json!({"count": 1}));

    let stored = h.dispatcher.store().load();
    assert_eq!(stored[0].token, "ExponentPushToken[b]");
    assert_eq!(stored[0].platform, Platform::Ios);

    let (status, body) = call(
        &h.app,
        "DELETE",
        "/push-token",
        Some(json!({"deviceId": "d1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    // Idempotent
    let (status, _) = call(&h.app, "DELETE", "/push-token", Some(json!({"deviceId": "d1"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&h.app, "GET", "/push-token", None).await;
    assert_eq!(body, json!({"count": 0}));
}

#[tokio::test]
async fn test_missing_fields_is_bad_request() {
    let h = harness("http://127.0.0.1:9/unused");

    let (status, body) = call(&h.app, "POST", "/push-token", Some(json!({"token": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing fields");

    let (status, body) = call(&h.app, "DELETE", "/push-token", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing fields");

    let (status, _) = call(&h.app, "POST", "/push-token", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn test_preflight_is_no_content_with_cors_headers() {
    let h = harness("http://127.0.0.1:9/unused");

    for uri in ["/push-token", "/push-token/test"] {
        let request = Request::builder()
            .method("OPTIONS")
            .uri(uri)
            .header("origin", "https://app.example")
            .header("access-control-request-method", "DELETE")
            .body(Body::empty())
            .unwrap();

        let response = h.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert!(headers["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .contains("DELETE"));
    }

    let request = Request::builder()
        .uri("/push-token")
        .header("origin", "https://app.example")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_successful_send_keeps_device() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"status": "ok", "id": "ticket-1"}]
        })))
        .expect(1)
        .mount(&relay)
        .await;

    let h = harness(&format!("{}/push", relay.uri()));
    h.dispatcher.register("d1", "t1", Platform::Ios).unwrap();

    let report = h.dispatcher.send(&session_complete()).await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.pruned, 0);
    assert_eq!(h.dispatcher.store().load().len(), 1);

    let requests = relay.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent[0]["to"], "t1");
    assert_eq!(sent[0]["title"], "✅ Session Complete");
    assert_eq!(sent[0]["body"], "Task completed");
    assert_eq!(sent[0]["sound"], "default");
    assert_eq!(sent[0]["priority"], "high");
}

#[tokio::test]
async fn test_device_not_registered_is_pruned() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"status": "error", "message": "gone", "details": {"error": "DeviceNotRegistered"}}
        ])))
        .mount(&relay)
        .await;

    let h = harness(&relay.uri());
    h.dispatcher.register("d1", "t1", Platform::Ios).unwrap();

    let report = h.dispatcher.send(&session_complete()).await.unwrap();

    assert_eq!(report.pruned, 1);
    assert!(h.dispatcher.store().load().is_empty());
}

#[tokio::test]
async fn test_invalid_credentials_pruned_among_mixed_results() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
            {"status": "ok"},
            {"status": "error", "details": {"error": "InvalidCredentials"}},
            {"status": "error", "details": {"error": "MessageTooBig"}}
        ]})))
        .mount(&relay)
        .await;

    let h = harness(&relay.uri());
    h.dispatcher.register("d1", "t1", Platform::Ios).unwrap();
    h.dispatcher.register("d2", "t2", Platform::Android).unwrap();
    h.dispatcher.register("d3", "t3", Platform::Ios).unwrap();

    let report = h.dispatcher.send(&session_complete()).await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.pruned, 1);
    let remaining: Vec<String> = h
        .dispatcher
        .store()
        .load()
        .into_iter()
        .map(|t| t.device_id)
        .collect();
    assert_eq!(remaining, vec!["d1", "d3"]);
}

#[tokio::test]
async fn test_test_endpoint() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"status": "ok"}])))
        .expect(1)
        .mount(&relay)
        .await;

    let h = harness(&relay.uri());
    h.dispatcher.register("d1", "t1", Platform::Ios).unwrap();

    let (status, body) = call(&h.app, "POST", "/push-token/test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
}

#[tokio::test]
async fn test_test_endpoint_reports_relay_failure() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&relay)
        .await;

    let h = harness(&relay.uri());
    h.dispatcher.register("d1", "t1", Platform::Ios).unwrap();

    let (status, body) = call(&h.app, "POST", "/push-token/test", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "server-error");
    assert_eq!(h.dispatcher.count(), 1);
}
