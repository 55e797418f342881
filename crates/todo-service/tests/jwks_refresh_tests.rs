//! Key set cache integration tests.
//!
//! Exercises initial load, fetch timeouts, refresh-on-miss, throttling,
//! coalescing and key rotation against a wiremock identity provider.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use todo_service::auth::{
    AuthFailure, KeySetCache, KeySetOptions, RefreshOutcome, TokenVerifier, VerifierOptions,
};
use todo_test_utils::{valid_claims, MockJwksProvider, TestKeypair, TestTodoServer};

fn options(min_refresh_interval: Duration) -> KeySetOptions {
    KeySetOptions {
        fetch_timeout: Duration::from_secs(2),
        min_refresh_interval,
    }
}

#[tokio::test]
async fn test_initialize_loads_keys() -> Result<()> {
    let a = TestKeypair::new(1, "a");
    let b = TestKeypair::new(2, "b");
    let provider = MockJwksProvider::start(&[&a, &b]).await;

    let cache = KeySetCache::initialize(provider.jwks_url(), options(Duration::ZERO)).await?;

    let snapshot = cache.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.kids().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(provider.fetch_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_initialize_fails_when_provider_errors() {
    let provider = MockJwksProvider::start_failing(500).await;

    let result = KeySetCache::initialize(provider.jwks_url(), options(Duration::ZERO)).await;

    assert!(matches!(result, Err(AuthFailure::KeySourceUnavailable)));
}

#[tokio::test]
async fn test_initialize_fails_when_provider_unreachable() {
    let result = KeySetCache::initialize(
        "http://127.0.0.1:9/api/auth/jwks".to_string(),
        options(Duration::ZERO),
    )
    .await;

    assert!(matches!(result, Err(AuthFailure::KeySourceUnavailable)));
}

#[tokio::test]
async fn test_initialize_fails_on_invalid_body() -> Result<()> {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    let provider = MockJwksProvider::start(&[]).await;
    provider.server().reset().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(provider.server())
        .await;

    let result = KeySetCache::initialize(provider.jwks_url(), options(Duration::ZERO)).await;
    assert!(matches!(result, Err(AuthFailure::KeySourceUnavailable)));

    Ok(())
}

#[tokio::test]
async fn test_initialize_times_out_on_slow_provider() {
    let key = TestKeypair::new(1, "key-1");
    let provider = MockJwksProvider::start(&[]).await;
    provider
        .publish_delayed(&[&key], Duration::from_secs(2))
        .await;

    let options = KeySetOptions {
        fetch_timeout: Duration::from_millis(200),
        min_refresh_interval: Duration::ZERO,
    };
    let started = Instant::now();
    let result = KeySetCache::initialize(provider.jwks_url(), options).await;

    assert!(matches!(result, Err(AuthFailure::KeySourceUnavailable)));
    assert!(started.elapsed() < Duration::from_millis(1500));
}

#[tokio::test]
async fn test_refresh_times_out_and_keeps_snapshot() -> Result<()> {
    let old = TestKeypair::new(1, "old");
    let new = TestKeypair::new(2, "new");
    let provider = MockJwksProvider::start(&[&old]).await;
    let options = KeySetOptions {
        fetch_timeout: Duration::from_millis(200),
        min_refresh_interval: Duration::ZERO,
    };
    let cache = KeySetCache::initialize(provider.jwks_url(), options).await?;

    provider
        .publish_delayed(&[&new], Duration::from_secs(2))
        .await;

    let started = Instant::now();
    assert_eq!(cache.refresh().await, Err(AuthFailure::RefreshFailed));
    assert!(started.elapsed() < Duration::from_millis(1500));

    assert!(cache.lookup("old").await.is_some());
    assert!(cache.lookup("new").await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_unknown_kid_triggers_exactly_one_fetch() -> Result<()> {
    let old = TestKeypair::new(1, "old");
    let provider = MockJwksProvider::start(&[&old]).await;
    let cache = Arc::new(
        KeySetCache::initialize(provider.jwks_url(), options(Duration::ZERO)).await?,
    );
    let verifier = TokenVerifier::new(cache, VerifierOptions::default());

    let stranger = TestKeypair::new(7, "stranger");
    let token = stranger.sign(&valid_claims("user-42"));

    provider.publish(&[&old]).await;
    assert_eq!(verifier.verify(&token).await.unwrap_err(), AuthFailure::UnknownKey);
    assert_eq!(provider.fetch_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_rotated_key_is_picked_up_on_miss() -> Result<()> {
    let old = TestKeypair::new(1, "old");
    let new = TestKeypair::new(2, "new");
    let provider = MockJwksProvider::start(&[&old]).await;
    let cache = Arc::new(
        KeySetCache::initialize(provider.jwks_url(), options(Duration::ZERO)).await?,
    );
    let verifier = TokenVerifier::new(cache.clone(), VerifierOptions::default());

    provider.publish(&[&new]).await;

    let token = new.sign(&valid_claims("user-42"));
    let identity = verifier.verify(&token).await?;
    assert_eq!(identity.subject(), "user-42");

    // The old key left the published set and the snapshot was replaced.
    assert!(cache.lookup("old").await.is_none());
    assert!(cache.lookup("new").await.is_some());

    Ok(())
}

#[tokio::test]
async fn test_known_kid_never_fetches() -> Result<()> {
    let key = TestKeypair::new(1, "key-1");
    let provider = MockJwksProvider::start(&[&key]).await;
    let cache = Arc::new(
        KeySetCache::initialize(provider.jwks_url(), options(Duration::ZERO)).await?,
    );
    let verifier = TokenVerifier::new(cache, VerifierOptions::default());

    for _ in 0..5 {
        let token = key.sign(&valid_claims("user-42"));
        verifier.verify(&token).await?;
    }

    assert_eq!(provider.fetch_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_refresh_throttled_within_interval() -> Result<()> {
    let key = TestKeypair::new(1, "key-1");
    let provider = MockJwksProvider::start(&[&key]).await;
    let cache = KeySetCache::initialize(provider.jwks_url(), options(Duration::from_secs(60))).await?;

    assert_eq!(cache.refresh().await, Ok(RefreshOutcome::Refreshed));
    assert_eq!(cache.refresh().await, Ok(RefreshOutcome::Throttled));
    assert_eq!(provider.fetch_count().await, 2);

    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_still_throttles() -> Result<()> {
    let key = TestKeypair::new(1, "key-1");
    let provider = MockJwksProvider::start(&[&key]).await;
    let cache = KeySetCache::initialize(provider.jwks_url(), options(Duration::from_secs(60))).await?;

    provider.fail_with(503).await;
    assert_eq!(cache.refresh().await, Err(AuthFailure::RefreshFailed));
    assert_eq!(cache.refresh().await, Ok(RefreshOutcome::Throttled));
    assert_eq!(provider.fetch_count().await, 1);

    // Previous snapshot survives the failure.
    assert!(cache.lookup("key-1").await.is_some());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_refreshes_coalesce() -> Result<()> {
    let old = TestKeypair::new(1, "old");
    let new = TestKeypair::new(2, "new");
    let provider = MockJwksProvider::start(&[&old]).await;
    let cache = Arc::new(
        KeySetCache::initialize(provider.jwks_url(), options(Duration::ZERO)).await?,
    );

    provider
        .publish_delayed(&[&old, &new], Duration::from_millis(300))
        .await;

    let outcomes = join_all((0..10).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.refresh().await })
    }))
    .await;

    let outcomes: Vec<RefreshOutcome> = outcomes
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == RefreshOutcome::Refreshed)
            .count(),
        1
    );
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, RefreshOutcome::Refreshed | RefreshOutcome::Coalesced)));
    assert_eq!(provider.fetch_count().await, 1);
    assert!(cache.lookup("new").await.is_some());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_unknown_kid_requests_share_one_fetch() -> Result<()> {
    let old = TestKeypair::new(1, "old");
    let new = TestKeypair::new(2, "new");
    let provider = MockJwksProvider::start(&[&old]).await;
    let server = TestTodoServer::spawn(&provider.url()).await?;

    provider
        .publish_delayed(&[&old, &new], Duration::from_millis(300))
        .await;

    let token = new.sign(&valid_claims("user-42"));
    let client = reqwest::Client::new();
    let responses = join_all((0..8).map(|_| {
        client
            .get(format!("{}/api/todos", server.url()))
            .header("Authorization", format!("Bearer {token}"))
            .send()
    }))
    .await;

    for response in responses {
        assert_eq!(response?.status(), reqwest::StatusCode::OK);
    }
    assert_eq!(provider.fetch_count().await, 1);

    Ok(())
}
