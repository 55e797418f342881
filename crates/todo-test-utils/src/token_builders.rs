//! Builder patterns for test claims
//!
//! Provides claim sets for signing with `TestKeypair`, and a helper that
//! swaps a signed token's payload to exercise signature checks.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("alice")
///     .expires_in(3600)
///     .with_audience("todo-api")
///     .build();
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Subject `test-subject`, issued now, expires in one hour.
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims }
    }

    /// Set the subject
    pub fn for_user(self, subject: &str) -> Self {
        self.with_claim("sub", json!(subject))
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.with_claim("exp", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set issued-at timestamp
    pub fn issued_at(self, timestamp: i64) -> Self {
        self.with_claim("iat", json!(timestamp))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.with_claim("nbf", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    pub fn with_issuer(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    pub fn with_audience(self, audience: &str) -> Self {
        self.with_claim("aud", json!(audience))
    }

    /// Set any claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Claims for `subject`, issued now, expiring in one hour.
pub fn valid_claims(subject: &str) -> Value {
    TestTokenBuilder::new().for_user(subject).build()
}

/// Claims for `subject` that expired an hour ago.
pub fn expired_claims(subject: &str) -> Value {
    TestTokenBuilder::new()
        .for_user(subject)
        .issued_at((Utc::now() - Duration::seconds(7200)).timestamp())
        .expires_in(-3600)
        .build()
}

/// Replace the payload of a signed token, keeping its header and signature.
///
/// The result is structurally valid but its signature no longer matches.
pub fn tamper_payload(token: &str, claims: &Value) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3, "expected a compact JWT");
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.{}", parts[0], payload, parts[2])
}
