//! Management API Integration Tests

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::*;
use realtime_relay::management::ManagementServer;
use realtime_relay::relay::Direction;
use tower::ServiceExt;

fn test_router(shutting_down: Arc<AtomicBool>) -> (Router, Arc<realtime_relay::RelayEngine>) {
    let engine = test_engine("ws://127.0.0.1:1/v1/realtime");
    let server = ManagementServer::new(
        "127.0.0.1:0".parse().unwrap(),
        Arc::clone(&engine),
        shutting_down,
    );
    (server.create_test_router(), engine)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_management_api_health_endpoint() {
    let shutting_down = Arc::new(AtomicBool::new(false));
    let (app, _) = test_router(Arc::clone(&shutting_down));

    let (status, body) = get(app.clone(), "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["success"], true);
    assert_eq!(value["data"]["status"], "healthy");

    shutting_down.store(true, Ordering::Relaxed);
    let (_, body) = get(app, "/api/v1/health").await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["data"]["status"], "draining");
    assert_eq!(value["data"]["shutting_down"], true);
}

#[tokio::test]
async fn test_management_api_status_endpoint() {
    let (app, engine) = test_router(Arc::new(AtomicBool::new(false)));
    engine.metrics().message_forwarded(Direction::Upstream, 12);
    engine.metrics().message_dropped();

    let (status, body) = get(app, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);

    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let data = &value["data"];
    assert_eq!(data["path"], "/realtime");
    assert_eq!(data["active_sessions"], 0);
    assert_eq!(data["messages_upstream"], 1);
    assert_eq!(data["messages_downstream"], 0);
    assert_eq!(data["messages_dropped"], 1);
    assert!(data["version"].is_string());
}

#[tokio::test]
async fn test_management_api_status_hides_token() {
    let (app, _) = test_router(Arc::new(AtomicBool::new(false)));

    let (_, body) = get(app, "/api/v1/status").await;
    let text = String::from_utf8(body).unwrap();
    assert!(!text.contains("sk-test"));
}

#[tokio::test]
async fn test_management_api_sessions_endpoint() {
    let (app, _) = test_router(Arc::new(AtomicBool::new(false)));

    let (status, body) = get(app, "/api/v1/sessions").await;
    assert_eq!(status, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["data"], serde_json::json!([]));
}

#[tokio::test]
async fn test_management_api_metrics_endpoint() {
    let (app, engine) = test_router(Arc::new(AtomicBool::new(false)));
    engine.metrics().upstream_error();

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("relay_upstream_errors_total 1"));
    assert!(text.contains("relay_active_sessions"));
}

#[tokio::test]
async fn test_management_api_unknown_route() {
    let (app, _) = test_router(Arc::new(AtomicBool::new(false)));

    let (status, _) = get(app, "/api/v1/routes").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
