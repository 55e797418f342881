//! JWT header and claim utilities for bearer-token verification.
//!
//! These helpers run BEFORE any signature check, so nothing they return is
//! trusted: the header values are only used to pick a key from a trusted key
//! set, and the key set decides which algorithm is acceptable.
//!
//! - Size limit applied before any decoding
//! - Unverified header parsing (`alg`, `kid`)
//! - `iat` validation with clock skew tolerance
//! - JWK public key decoding for Ed25519 (`OKP`) keys
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_unverified_header, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! let header = decode_unverified_header(token)?;
//! let key = key_set.lookup(&header.kid);
//! // ... verify signature with the key's registered algorithm ...
//! validate_iat(iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens above this size are rejected before base64 decoding or any
/// cryptographic work. Better Auth EdDSA tokens are well under 1KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes).
///
/// Tokens with `iat` further than this in the future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors from pre-verification token inspection.
///
/// Display strings are generic on purpose; callers log the variant at debug
/// level and return their own client-facing error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not three dot-separated base64url segments with a JSON header.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header has no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Header has no usable `alg`.
    #[error("The access token is invalid or expired")]
    MissingAlg,

    /// `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Header
// =============================================================================

/// Unverified JOSE header fields needed to select a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedHeader {
    /// Algorithm the token claims to be signed with. Never used to choose the
    /// verification algorithm, only compared against the key's.
    pub alg: String,

    /// Key identifier used to look the key up in the key set.
    pub kid: String,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<serde_json::Value>,
    #[serde(default)]
    kid: Option<serde_json::Value>,
}

/// Decode the JWT header without verifying the signature.
///
/// # Security
///
/// - Size is checked before any parsing
/// - The result MUST NOT be trusted beyond key lookup
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong segment count, bad base64url, or non-JSON header
/// - `MissingKid` - `kid` absent, not a string, or empty
/// - `MissingAlg` - `alg` absent, not a string, or empty
pub fn decode_unverified_header(token: &str) -> Result<UnverifiedHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let kid = non_empty_string(header.kid).ok_or(JwtValidationError::MissingKid)?;
    let alg = non_empty_string(header.alg).ok_or(JwtValidationError::MissingAlg)?;

    Ok(UnverifiedHeader { alg, kid })
}

fn non_empty_string(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

// =============================================================================
// Claims
// =============================================================================

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat` is more than `clock_skew` ahead of now.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // clock_skew is bounded by MAX_CLOCK_SKEW at config load
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Key material
// =============================================================================

/// Length of a raw Ed25519 public key.
pub const ED25519_PUBLIC_KEY_LEN: usize = 32;

/// Decode an Ed25519 public key from a JWK `x` field (base64url, no padding).
///
/// # Errors
///
/// Returns `MalformedToken` if `x` is not base64url or does not decode to
/// exactly 32 bytes.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(x_b64url)
        .map_err(|_| JwtValidationError::MalformedToken)?;
    if bytes.len() != ED25519_PUBLIC_KEY_LEN {
        return Err(JwtValidationError::MalformedToken);
    }
    Ok(bytes)
}

// =============================================================================
// Tests
// =============================================================================
