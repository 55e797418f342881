//! Health, readiness and metrics endpoint tests.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use todo_test_utils::{valid_claims, MockJwksProvider, TestKeypair, TestTodoServer};

#[tokio::test]
async fn test_health_returns_ok() -> Result<()> {
    let key = TestKeypair::new(1, "key-1");
    let provider = MockJwksProvider::start(&[&key]).await;
    let server = TestTodoServer::spawn(&provider.url()).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": "ok"}));

    Ok(())
}

#[tokio::test]
async fn test_ready_with_loaded_keys() -> Result<()> {
    let key = TestKeypair::new(1, "key-1");
    let provider = MockJwksProvider::start(&[&key]).await;
    let server = TestTodoServer::spawn(&provider.url()).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["key_set"], "loaded");
    assert_eq!(body["database"], "healthy");
    assert!(body.get("error").is_none());

    Ok(())
}

#[tokio::test]
async fn test_not_ready_with_empty_key_set() -> Result<()> {
    let provider = MockJwksProvider::start(&[]).await;
    let server = TestTodoServer::spawn(&provider.url()).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["key_set"], "empty");

    // Liveness does not depend on keys.
    let response = reqwest::get(format!("{}/health", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_becomes_ready_after_keys_are_published() -> Result<()> {
    let provider = MockJwksProvider::start(&[]).await;
    let server = TestTodoServer::spawn(&provider.url()).await?;

    let key = TestKeypair::new(1, "key-1");
    provider.publish(&[&key]).await;

    // A token with an unseen kid makes the cache refresh.
    let token = key.sign(&valid_claims("alice"));
    let response = reqwest::Client::new()
        .get(format!("{}/api/todos", server.url()))
        .bearer_auth(token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<()> {
    let key = TestKeypair::new(1, "key-1");
    let provider = MockJwksProvider::start(&[&key]).await;
    let server = TestTodoServer::spawn(&provider.url()).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_not_found() -> Result<()> {
    let key = TestKeypair::new(1, "key-1");
    let provider = MockJwksProvider::start(&[&key]).await;
    let server = TestTodoServer::spawn(&provider.url()).await?;

    let response = reqwest::get(format!("{}/nope", server.url())).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}
