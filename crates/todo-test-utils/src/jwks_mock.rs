//! Mock identity provider serving the key set document.
//!
//! Wraps a wiremock `MockServer` that answers `GET /api/auth/jwks` with the
//! JWKs of the given keypairs. Keys can be rotated and fetches counted.

use crate::crypto_fixtures::TestKeypair;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the todo service fetches the key set from.
pub const JWKS_PATH: &str = "/api/auth/jwks";

/// `{"keys": [...]}` for the given keypairs.
pub fn jwks_document(keys: &[&TestKeypair]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk_json()).collect::<Vec<_>>() })
}

/// Running mock identity provider.
pub struct MockJwksProvider {
    server: MockServer,
}

impl MockJwksProvider {
    /// Start a provider publishing `keys`.
    pub async fn start(keys: &[&TestKeypair]) -> Self {
        let provider = Self {
            server: MockServer::start().await,
        };
        provider.publish(keys).await;
        provider
    }

    /// Start a provider that answers every fetch with `status`.
    pub async fn start_failing(status: u16) -> Self {
        let provider = Self {
            server: MockServer::start().await,
        };
        provider.fail_with(status).await;
        provider
    }

    /// Base URL, i.e. the value for `AUTH_URL`.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Full key set URL.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Underlying wiremock server, for custom expectations.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Replace whatever is served with `keys`.
    pub async fn publish(&self, keys: &[&TestKeypair]) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` after `delay`, to hold a fetch in flight.
    pub async fn publish_delayed(&self, keys: &[&TestKeypair], delay: Duration) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks_document(keys))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Make every subsequent fetch fail with `status`.
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of key set fetches received since start or the last reset.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == JWKS_PATH)
                    .count()
            })
            .unwrap_or(0)
    }
}
