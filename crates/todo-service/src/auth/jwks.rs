//! Key set cache for the identity provider's published verification keys.
//!
//! Fetches the JSON Web Key Set from `{AUTH_URL}/api/auth/jwks` at startup and
//! again whenever a token references a `kid` that is not in the current
//! snapshot (key rotation).
//!
//! # Concurrency
//!
//! - The snapshot is an `Arc<KeySet>` behind a read-write lock. Readers clone
//!   the `Arc` and drop the lock, so a refresh never tears a lookup.
//! - Refreshes are serialized by an async mutex. Callers that queued behind
//!   an in-flight fetch return [`RefreshOutcome::Coalesced`] instead of
//!   fetching again.
//! - Fetch attempts are spaced by a minimum interval, failed attempts
//!   included, so a stream of unknown-`kid` tokens cannot turn into a stream
//!   of requests against the identity provider.
//! - Every fetch is bounded by the HTTP client timeout.

use crate::auth::failure::AuthFailure;
use crate::observability::metrics;
use common::jwt::decode_ed25519_public_key_jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Fixed path of the key set endpoint, relative to the identity provider URL.
pub const JWKS_PATH: &str = "/api/auth/jwks";

/// Default timeout for a single key set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default minimum spacing between refresh attempts.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Build the key set URL from the identity provider base URL.
pub fn jwks_url_from_base(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), JWKS_PATH)
}

/// JSON Web Key as published by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: "OKP", "RSA" or "EC".
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Curve name for OKP/EC keys ("Ed25519", "P-256", "P-384").
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key, or EC x coordinate (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm registered for this key.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (must be "sig" when present).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS response body. Entries are parsed one by one so a single odd key
/// does not discard the whole set.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<serde_json::Value>,
}

/// Why a published key was not loaded into the key set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyRejection {
    #[error("key use {0:?} is not \"sig\"")]
    NotSigningKey(String),

    #[error("unsupported key type or curve")]
    UnsupportedKeyType,

    #[error("algorithm {0:?} is not valid for this key")]
    AlgorithmMismatch(String),

    #[error("key material missing or malformed")]
    BadKeyMaterial,
}

/// A verification key with its algorithm bound at load time.
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: String,
    pub algorithm: Algorithm,
    pub decoding_key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Build a verification key from a published JWK.
    ///
    /// The algorithm comes from the JWK's `alg` when present and must fit the
    /// key type; otherwise it is inferred from `kty`/`crv`. Symmetric keys
    /// are never accepted.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyRejection> {
        if let Some(key_use) = &jwk.key_use {
            if key_use != "sig" {
                return Err(KeyRejection::NotSigningKey(key_use.clone()));
            }
        }

        let algorithm = resolve_algorithm(jwk)?;

        let decoding_key = match algorithm {
            Algorithm::EdDSA => {
                let x = jwk.x.as_deref().ok_or(KeyRejection::BadKeyMaterial)?;
                let bytes =
                    decode_ed25519_public_key_jwk(x).map_err(|_| KeyRejection::BadKeyMaterial)?;
                DecodingKey::from_ed_der(&bytes)
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => {
                let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                    return Err(KeyRejection::BadKeyMaterial);
                };
                DecodingKey::from_rsa_components(n, e).map_err(|_| KeyRejection::BadKeyMaterial)?
            }
            Algorithm::ES256 | Algorithm::ES384 => {
                let (Some(x), Some(y)) = (jwk.x.as_deref(), jwk.y.as_deref()) else {
                    return Err(KeyRejection::BadKeyMaterial);
                };
                DecodingKey::from_ec_components(x, y).map_err(|_| KeyRejection::BadKeyMaterial)?
            }
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(KeyRejection::UnsupportedKeyType)
            }
        };

        Ok(Self {
            kid: jwk.kid.clone(),
            algorithm,
            decoding_key,
        })
    }
}

/// Algorithms a key of the given type and curve can legitimately sign with.
fn algorithms_for(kty: &str, crv: Option<&str>) -> &'static [Algorithm] {
    match (kty, crv) {
        ("OKP", Some("Ed25519")) => &[Algorithm::EdDSA],
        ("RSA", _) => &[
            Algorithm::RS256,
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::PS256,
            Algorithm::PS384,
            Algorithm::PS512,
        ],
        ("EC", Some("P-256")) => &[Algorithm::ES256],
        ("EC", Some("P-384")) => &[Algorithm::ES384],
        _ => &[],
    }
}

fn resolve_algorithm(jwk: &Jwk) -> Result<Algorithm, KeyRejection> {
    let allowed = algorithms_for(&jwk.kty, jwk.crv.as_deref());
    let default = allowed.first().ok_or(KeyRejection::UnsupportedKeyType)?;

    match &jwk.alg {
        None => Ok(*default),
        Some(alg) => match Algorithm::from_str(alg) {
            Ok(parsed) if allowed.contains(&parsed) => Ok(parsed),
            _ => Err(KeyRejection::AlgorithmMismatch(alg.clone())),
        },
    }
}

/// Immutable snapshot of the published key set, indexed by `kid`.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Vec<Arc<VerificationKey>>,
    by_kid: HashMap<String, Arc<VerificationKey>>,
}

impl KeySet {
    /// Build a snapshot from a JWKS response, skipping unusable keys.
    ///
    /// The first key with a given `kid` wins; later duplicates are dropped.
    pub fn from_response(response: JwksResponse) -> Self {
        let mut set = KeySet::default();

        for raw in response.keys {
            let jwk: Jwk = match serde_json::from_value(raw) {
                Ok(jwk) => jwk,
                Err(e) => {
                    tracing::warn!(target: "todo.auth.jwks", error = %e, "Skipping unparseable JWK");
                    continue;
                }
            };

            if set.by_kid.contains_key(&jwk.kid) {
                tracing::warn!(target: "todo.auth.jwks", kid = %jwk.kid, "Skipping duplicate kid in JWKS");
                continue;
            }

            match VerificationKey::from_jwk(&jwk) {
                Ok(key) => {
                    let key = Arc::new(key);
                    set.by_kid.insert(key.kid.clone(), Arc::clone(&key));
                    set.keys.push(key);
                }
                Err(reason) => {
                    tracing::warn!(
                        target: "todo.auth.jwks",
                        kid = %jwk.kid,
                        kty = %jwk.kty,
                        reason = %reason,
                        "Skipping unusable JWK"
                    );
                }
            }
        }

        set
    }

    pub fn get(&self, kid: &str) -> Option<Arc<VerificationKey>> {
        self.by_kid.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in published order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.kid.as_str())
    }
}

/// Tuning knobs for the key set cache.
#[derive(Debug, Clone, Copy)]
pub struct KeySetOptions {
    /// Upper bound on a single fetch (connect + response).
    pub fetch_timeout: Duration,

    /// Minimum time between refresh attempts. Zero disables throttling.
    pub min_refresh_interval: Duration,
}

impl Default for KeySetOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }
}

/// What a call to [`KeySetCache::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This caller fetched and installed a new snapshot.
    Refreshed,
    /// Another caller's fetch finished while this one waited.
    Coalesced,
    /// The minimum refresh interval has not elapsed; nothing was fetched.
    Throttled,
}

#[derive(Debug, Error)]
enum FetchError {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid JWKS body: {0}")]
    Body(#[source] reqwest::Error),
}

/// Shared cache of the identity provider's verification keys.
///
/// Created once at startup with [`KeySetCache::initialize`] and handed to the
/// token verifier as an `Arc`.
pub struct KeySetCache {
    jwks_url: String,
    http_client: reqwest::Client,
    snapshot: RwLock<Arc<KeySet>>,
    /// Held for the whole refresh; stores when the last attempt started.
    refresh_gate: Mutex<Option<Instant>>,
    /// Completed refresh attempts, success or failure.
    attempts: AtomicU64,
    min_refresh_interval: Duration,
}

impl KeySetCache {
    /// Fetch the key set for the first time.
    ///
    /// # Errors
    ///
    /// Returns `AuthFailure::KeySourceUnavailable` if the HTTP client cannot
    /// be built or the initial fetch fails. Without a first snapshot no token
    /// can be verified, so callers should treat this as fatal.
    #[instrument(skip_all, fields(url = %jwks_url))]
    pub async fn initialize(jwks_url: String, options: KeySetOptions) -> Result<Self, AuthFailure> {
        let cache = Self::with_snapshot(jwks_url, KeySet::default(), options)?;

        let start = Instant::now();
        match cache.fetch().await {
            Ok(key_set) => {
                metrics::record_jwks_refresh("success", start.elapsed());
                cache.install(key_set).await;
                Ok(cache)
            }
            Err(e) => {
                metrics::record_jwks_refresh("error", start.elapsed());
                tracing::error!(
                    target: "todo.auth.jwks",
                    url = %cache.jwks_url,
                    error = %e,
                    "Initial JWKS fetch failed"
                );
                Err(AuthFailure::KeySourceUnavailable)
            }
        }
    }

    /// Build a cache around an existing snapshot without fetching.
    pub(crate) fn with_snapshot(
        jwks_url: String,
        key_set: KeySet,
        options: KeySetOptions,
    ) -> Result<Self, AuthFailure> {
        let http_client = reqwest::Client::builder()
            .timeout(options.fetch_timeout)
            .connect_timeout(options.fetch_timeout)
            .build()
            .map_err(|e| {
                tracing::error!(target: "todo.auth.jwks", error = %e, "Failed to build JWKS HTTP client");
                AuthFailure::KeySourceUnavailable
            })?;

        Ok(Self {
            jwks_url,
            http_client,
            snapshot: RwLock::new(Arc::new(key_set)),
            refresh_gate: Mutex::new(None),
            attempts: AtomicU64::new(0),
            min_refresh_interval: options.min_refresh_interval,
        })
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Current snapshot. Stays valid for the holder even if a refresh
    /// replaces it.
    pub async fn snapshot(&self) -> Arc<KeySet> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Look a key up in the current snapshot.
    pub async fn lookup(&self, kid: &str) -> Option<Arc<VerificationKey>> {
        let key = self.snapshot.read().await.get(kid);
        if key.is_some() {
            tracing::debug!(target: "todo.auth.jwks", kid = %kid, "JWKS cache hit");
        } else {
            tracing::debug!(target: "todo.auth.jwks", kid = %kid, "Key not found in JWKS cache");
        }
        key
    }

    /// Re-fetch the key set and replace the snapshot.
    ///
    /// At most one fetch runs at a time. A caller that waited behind another
    /// fetch returns `Coalesced` and observes that fetch's result.
    ///
    /// # Errors
    ///
    /// Returns `AuthFailure::RefreshFailed` if the fetch failed; the previous
    /// snapshot is kept.
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    pub async fn refresh(&self) -> Result<RefreshOutcome, AuthFailure> {
        let observed = self.attempts.load(Ordering::Acquire);
        let mut last_attempt = self.refresh_gate.lock().await;

        if self.attempts.load(Ordering::Acquire) != observed {
            tracing::debug!(target: "todo.auth.jwks", "JWKS refresh coalesced with in-flight fetch");
            return Ok(RefreshOutcome::Coalesced);
        }

        if let Some(started) = *last_attempt {
            if started.elapsed() < self.min_refresh_interval {
                tracing::debug!(
                    target: "todo.auth.jwks",
                    since_last = ?started.elapsed(),
                    "JWKS refresh throttled"
                );
                metrics::record_jwks_refresh("throttled", Duration::ZERO);
                return Ok(RefreshOutcome::Throttled);
            }
        }

        let start = Instant::now();
        *last_attempt = Some(start);

        let outcome = match self.fetch().await {
            Ok(key_set) => {
                metrics::record_jwks_refresh("success", start.elapsed());
                self.install(key_set).await;
                Ok(RefreshOutcome::Refreshed)
            }
            Err(e) => {
                metrics::record_jwks_refresh("error", start.elapsed());
                tracing::warn!(
                    target: "todo.auth.jwks",
                    error = %e,
                    "JWKS refresh failed, keeping previous key set"
                );
                Err(AuthFailure::RefreshFailed)
            }
        };

        // Bumped only after the new snapshot is visible, so a waiter that
        // sees the change also sees the keys.
        self.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn fetch(&self) -> Result<KeySet, FetchError> {
        tracing::debug!(target: "todo.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(FetchError::Request)?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body: JwksResponse = response.json().await.map_err(FetchError::Body)?;
        Ok(KeySet::from_response(body))
    }

    async fn install(&self, key_set: KeySet) {
        let key_count = key_set.len();
        *self.snapshot.write().await = Arc::new(key_set);
        metrics::set_jwks_key_count(key_count);
        tracing::info!(target: "todo.auth.jwks", key_count, "JWKS cache refreshed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use todo_test_utils::crypto_fixtures::TestKeypair;

    fn response(keys: Vec<serde_json::Value>) -> JwksResponse {
        JwksResponse { keys }
    }

    #[test]
    fn test_jwks_url_from_base() {
        assert_eq!(
            jwks_url_from_base("http://localhost:3000"),
            "http://localhost:3000/api/auth/jwks"
        );
        assert_eq!(
            jwks_url_from_base("https://auth.example.com/"),
            "https://auth.example.com/api/auth/jwks"
        );
    }

    #[test]
    fn test_jwk_deserialization() {
        let json = r#"{
            "kty": "OKP",
            "kid": "test-key-01",
            "crv": "Ed25519",
            "x": "dGVzdC1wdWJsaWMta2V5LWRhdGE",
            "alg": "EdDSA",
            "use": "sig"
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.kid, "test-key-01");
        assert_eq!(jwk.crv.as_deref(), Some("Ed25519"));
        assert_eq!(jwk.alg.as_deref(), Some("EdDSA"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
        assert!(jwk.n.is_none());
    }

    #[test]
    fn test_ed25519_key_without_alg_infers_eddsa() {
        let keypair = TestKeypair::new(1, "k1");
        let mut jwk_json = keypair.jwk_json();
        jwk_json.as_object_mut().unwrap().remove("alg");

        let jwk: Jwk = serde_json::from_value(jwk_json).unwrap();
        let key = VerificationKey::from_jwk(&jwk).unwrap();
        assert_eq!(key.algorithm, Algorithm::EdDSA);
    }

    #[test]
    fn test_alg_must_fit_key_type() {
        let keypair = TestKeypair::new(1, "k1");
        let mut jwk_json = keypair.jwk_json();
        jwk_json["alg"] = serde_json::json!("RS256");

        let jwk: Jwk = serde_json::from_value(jwk_json).unwrap();
        assert_eq!(
            VerificationKey::from_jwk(&jwk).unwrap_err(),
            KeyRejection::AlgorithmMismatch("RS256".to_string())
        );
    }

    #[test]
    fn test_symmetric_and_unknown_keys_rejected() {
        let oct: Jwk =
            serde_json::from_str(r#"{"kty":"oct","kid":"s","k":"c2VjcmV0","alg":"HS256"}"#)
                .unwrap();
        assert_eq!(
            VerificationKey::from_jwk(&oct).unwrap_err(),
            KeyRejection::UnsupportedKeyType
        );

        let x448: Jwk =
            serde_json::from_str(r#"{"kty":"OKP","kid":"x","crv":"X448","x":"AAAA"}"#).unwrap();
        assert_eq!(
            VerificationKey::from_jwk(&x448).unwrap_err(),
            KeyRejection::UnsupportedKeyType
        );
    }

    #[test]
    fn test_encryption_key_rejected() {
        let keypair = TestKeypair::new(1, "k1");
        let mut jwk_json = keypair.jwk_json();
        jwk_json["use"] = serde_json::json!("enc");

        let jwk: Jwk = serde_json::from_value(jwk_json).unwrap();
        assert!(matches!(
            VerificationKey::from_jwk(&jwk),
            Err(KeyRejection::NotSigningKey(_))
        ));
    }

    #[test]
    fn test_missing_or_bad_material_rejected() {
        let missing_x: Jwk =
            serde_json::from_str(r#"{"kty":"OKP","kid":"k","crv":"Ed25519","alg":"EdDSA"}"#)
                .unwrap();
        assert_eq!(
            VerificationKey::from_jwk(&missing_x).unwrap_err(),
            KeyRejection::BadKeyMaterial
        );

        let short_x: Jwk = serde_json::from_str(
            r#"{"kty":"OKP","kid":"k","crv":"Ed25519","x":"dGVzdA","alg":"EdDSA"}"#,
        )
        .unwrap();
        assert_eq!(
            VerificationKey::from_jwk(&short_x).unwrap_err(),
            KeyRejection::BadKeyMaterial
        );

        let rsa_missing_e: Jwk =
            serde_json::from_str(r#"{"kty":"RSA","kid":"r","n":"AQAB"}"#).unwrap();
        assert_eq!(
            VerificationKey::from_jwk(&rsa_missing_e).unwrap_err(),
            KeyRejection::BadKeyMaterial
        );
    }

    #[test]
    fn test_key_set_skips_bad_entries_and_duplicates() {
        let first = TestKeypair::new(1, "dup");
        let second = TestKeypair::new(2, "dup");
        let other = TestKeypair::new(3, "other");

        let set = KeySet::from_response(response(vec![
            first.jwk_json(),
            serde_json::json!({"no_kid": true}),
            second.jwk_json(),
            serde_json::json!({"kty": "oct", "kid": "hmac", "k": "c2VjcmV0"}),
            other.jwk_json(),
        ]));

        assert_eq!(set.len(), 2);
        assert_eq!(set.kids().collect::<Vec<_>>(), vec!["dup", "other"]);
        assert!(set.get("hmac").is_none());
        assert!(set.get("dup").is_some());
    }

    #[test]
    fn test_empty_key_set() {
        let set = KeySet::from_response(response(vec![]));
        assert!(set.is_empty());
        assert!(set.get("anything").is_none());
    }

    #[test]
    fn test_verification_key_debug_omits_material() {
        let keypair = TestKeypair::new(1, "k1");
        let jwk: Jwk = serde_json::from_value(keypair.jwk_json()).unwrap();
        let key = VerificationKey::from_jwk(&jwk).unwrap();

        let debug = format!("{key:?}");
        assert!(debug.contains("k1"));
        assert!(debug.contains("EdDSA"));
        assert!(!debug.contains("decoding_key"));
    }

    #[test]
    fn test_default_options() {
        let options = KeySetOptions::default();
        assert_eq!(options.fetch_timeout, Duration::from_secs(10));
        assert_eq!(options.min_refresh_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_lookup_reads_current_snapshot() {
        let keypair = TestKeypair::new(1, "k1");
        let set = KeySet::from_response(response(vec![keypair.jwk_json()]));
        let cache = KeySetCache::with_snapshot(
            "http://127.0.0.1:9/api/auth/jwks".to_string(),
            set,
            KeySetOptions::default(),
        )
        .unwrap();

        assert!(cache.lookup("k1").await.is_some());
        assert!(cache.lookup("k2").await.is_none());
        assert_eq!(cache.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_snapshot() {
        let keypair = TestKeypair::new(1, "k1");
        let set = KeySet::from_response(response(vec![keypair.jwk_json()]));
        // Port 9 (discard) is not listening; connection is refused quickly
        let cache = KeySetCache::with_snapshot(
            "http://127.0.0.1:9/api/auth/jwks".to_string(),
            set,
            KeySetOptions {
                fetch_timeout: Duration::from_secs(2),
                min_refresh_interval: Duration::ZERO,
            },
        )
        .unwrap();

        assert_eq!(cache.refresh().await, Err(AuthFailure::RefreshFailed));
        assert!(cache.lookup("k1").await.is_some());
    }

    #[tokio::test]
    async fn test_refresh_throttled_after_attempt() {
        let cache = KeySetCache::with_snapshot(
            "http://127.0.0.1:9/api/auth/jwks".to_string(),
            KeySet::default(),
            KeySetOptions {
                fetch_timeout: Duration::from_secs(2),
                min_refresh_interval: Duration::from_secs(60),
            },
        )
        .unwrap();

        // First attempt fails, but still stamps the gate
        assert_eq!(cache.refresh().await, Err(AuthFailure::RefreshFailed));
        assert_eq!(cache.refresh().await, Ok(RefreshOutcome::Throttled));
    }
}
