//! Health endpoint integration tests.
//!
//! Tests `/health`, `/ready` and `/metrics` using the `TestStreamServer`
//! harness.

use sc_test_utils::TestStreamServer;
use std::sync::Arc;
use stream_controller::services::control_client::mock::{MockControlPlane, MockOp};

/// Test that health endpoint returns 200 and healthy status.
#[tokio::test]
async fn test_health_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(Arc::new(MockControlPlane::new())).await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");

    Ok(())
}

/// Liveness does not touch the media server.
#[tokio::test]
async fn test_health_does_not_call_media_server() -> Result<(), anyhow::Error> {
    let mock = Arc::new(MockControlPlane::new().failing_on(MockOp::ListRooms));
    let server = TestStreamServer::spawn(mock.clone()).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(mock.total_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_health_endpoint_returns_json() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(Arc::new(MockControlPlane::new())).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok());

    assert!(
        content_type.is_some_and(|ct| ct.contains("application/json")),
        "Expected application/json content type, got {:?}",
        content_type
    );

    Ok(())
}

#[tokio::test]
async fn test_ready_when_media_server_reachable() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(Arc::new(MockControlPlane::new())).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");

    Ok(())
}

/// Readiness is 503 with a generic message when ListRooms fails.
#[tokio::test]
async fn test_not_ready_when_media_server_fails() -> Result<(), anyhow::Error> {
    let mock = Arc::new(MockControlPlane::new().failing_on(MockOp::ListRooms));
    let server = TestStreamServer::spawn(mock).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    assert!(!body.to_string().contains("mock failure"));

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_returns_text() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(Arc::new(MockControlPlane::new())).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), 200);
    response.text().await?;

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(Arc::new(MockControlPlane::new())).await?;

    let response = reqwest::get(format!("{}/api/nonexistent", server.url())).await?;

    assert_eq!(response.status(), 404);

    Ok(())
}
