//! Bearer token verification against the cached key set.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - The verification algorithm is the one registered with the resolved key;
//!   a token whose header names another algorithm is rejected
//! - `exp`/`nbf` are validated when present, `iat` with clock skew tolerance
//! - Signature and claim failures are permanent for a token: no retries
//! - Failure details are logged at debug level, never returned to clients

use crate::auth::claims::{ClaimSet, TokenClaims, VerifiedIdentity};
use crate::auth::failure::AuthFailure;
use crate::auth::jwks::{KeySetCache, RefreshOutcome, VerificationKey};
use crate::observability::metrics;
use common::jwt::{decode_unverified_header, validate_iat, DEFAULT_CLOCK_SKEW};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Claim checks beyond the signature.
#[derive(Debug, Clone)]
pub struct VerifierOptions {
    /// Clock skew tolerance for `iat`.
    pub clock_skew: Duration,

    /// Expected `iss`, if any.
    pub issuer: Option<String>,

    /// Expected `aud`, if any. When unset, `aud` is not checked.
    pub audience: Option<String>,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            clock_skew: DEFAULT_CLOCK_SKEW,
            issuer: None,
            audience: None,
        }
    }
}

/// Token verifier backed by the shared key set cache.
///
/// Holds no state of its own besides configuration; safe to share across
/// all request tasks.
pub struct TokenVerifier {
    key_cache: Arc<KeySetCache>,
    options: VerifierOptions,
}

impl TokenVerifier {
    pub fn new(key_cache: Arc<KeySetCache>, options: VerifierOptions) -> Self {
        Self { key_cache, options }
    }

    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        &self.key_cache
    }

    /// Verify a raw bearer token and return the identity it carries.
    ///
    /// # Steps
    ///
    /// 1. Size check and unverified header parse (`alg`, `kid`)
    /// 2. Key lookup; on miss, one refresh and one more lookup
    /// 3. Algorithm binding: header `alg` must equal the key's algorithm
    /// 4. Signature, `exp`, `nbf`, and optional `iss`/`aud`
    /// 5. `iat` with clock skew tolerance
    /// 6. Non-empty string `sub`
    ///
    /// # Errors
    ///
    /// Returns the `AuthFailure` describing the first check that failed.
    #[instrument(skip_all, name = "todo.auth.verify")]
    pub async fn verify(&self, raw_token: &str) -> Result<VerifiedIdentity, AuthFailure> {
        let result = self.verify_token(raw_token).await;

        match &result {
            Ok(_) => {
                tracing::debug!(target: "todo.auth.jwt", "Token validated successfully");
                metrics::record_jwt_validation("success");
            }
            Err(failure) => {
                tracing::debug!(target: "todo.auth.jwt", reason = %failure, "Token rejected");
                metrics::record_jwt_validation(failure.metric_label());
            }
        }

        result
    }

    async fn verify_token(&self, raw_token: &str) -> Result<VerifiedIdentity, AuthFailure> {
        let header = decode_unverified_header(raw_token).map_err(|e| {
            tracing::debug!(target: "todo.auth.jwt", error = ?e, "Token header inspection failed");
            AuthFailure::MalformedToken
        })?;

        let key = self.resolve_key(&header.kid).await?;

        if Algorithm::from_str(&header.alg).ok() != Some(key.algorithm) {
            tracing::warn!(
                target: "todo.auth.jwt",
                kid = %key.kid,
                token_alg = %header.alg,
                key_alg = ?key.algorithm,
                "Token algorithm does not match key algorithm"
            );
            return Err(AuthFailure::InvalidSignature);
        }

        let claims = self.verify_signature(raw_token, &key)?;

        let typed = TokenClaims::new(&claims);
        typed.expires_at()?;
        if let Some(iat) = typed.issued_at()? {
            validate_iat(iat, self.options.clock_skew).map_err(|e| {
                tracing::debug!(target: "todo.auth.jwt", error = ?e, "Token iat validation failed");
                AuthFailure::Expired
            })?;
        }

        VerifiedIdentity::from_claims(claims)
    }

    /// Find the key for `kid`, refreshing the key set once on a miss.
    async fn resolve_key(&self, kid: &str) -> Result<Arc<VerificationKey>, AuthFailure> {
        if let Some(key) = self.key_cache.lookup(kid).await {
            return Ok(key);
        }

        match self.key_cache.refresh().await {
            Ok(RefreshOutcome::Throttled) => {
                tracing::debug!(target: "todo.auth.jwt", kid = %kid, "Refresh throttled for unknown kid");
            }
            Ok(outcome) => {
                tracing::debug!(target: "todo.auth.jwt", kid = %kid, ?outcome, "Key set refreshed for unknown kid");
            }
            // Already logged by the cache; the request only sees UnknownKey
            Err(_) => {}
        }

        self.key_cache.lookup(kid).await.ok_or_else(|| {
            tracing::warn!(target: "todo.auth.jwt", kid = %kid, "Key not found in JWKS after refresh");
            AuthFailure::UnknownKey
        })
    }

    fn verify_signature(
        &self,
        raw_token: &str,
        key: &VerificationKey,
    ) -> Result<ClaimSet, AuthFailure> {
        let validation = self.validation_for(key.algorithm);

        decode::<ClaimSet>(raw_token, &key.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(target: "todo.auth.jwt", error = %e, "Token verification failed");
                failure_from_jwt_error(e.kind())
            })
    }

    fn validation_for(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        // exp and nbf are checked when present, never required
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // iat skew is handled by validate_iat; exp/nbf are exact
        validation.leeway = 0;

        match &self.options.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.options.issuer {
            validation.set_issuer(&[issuer]);
        }

        validation
    }
}

fn failure_from_jwt_error(kind: &ErrorKind) -> AuthFailure {
    match kind {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => AuthFailure::Expired,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::MissingRequiredClaim(_) => AuthFailure::InvalidClaims,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            AuthFailure::MalformedToken
        }
        _ => AuthFailure::InvalidSignature,
    }
}
