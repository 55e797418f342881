//! Authentication failure taxonomy.
//!
//! Every variant maps to a stable reason code for the response body and
//! metrics. The client-facing message is identical for all of them.

use thiserror::Error;

/// Generic message returned to clients for every authentication failure.
pub const GENERIC_AUTH_MESSAGE: &str = "The access token is invalid or expired";

/// Why a request could not be authenticated, or why the key source failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// No `Authorization` header.
    #[error("missing Authorization header")]
    MissingHeader,

    /// Header present but not exactly `Bearer <token>`.
    #[error("malformed Authorization header")]
    MalformedHeader,

    /// Token is not a structurally valid JWT (size, segments, header).
    #[error("malformed token")]
    MalformedToken,

    /// Token `kid` not in the key set, even after one refresh.
    #[error("unknown signing key")]
    UnknownKey,

    /// Signature did not verify, or the token's algorithm does not match the
    /// algorithm registered for its key.
    #[error("invalid signature")]
    InvalidSignature,

    /// `exp`, `nbf` or `iat` outside the accepted window.
    #[error("token expired or not yet valid")]
    Expired,

    /// Issuer or audience mismatch.
    #[error("invalid token claims")]
    InvalidClaims,

    /// `sub` absent, empty, or not a string.
    #[error("missing subject claim")]
    MissingSubject,

    /// The initial key-set fetch failed. Fatal at startup.
    #[error("key source unavailable")]
    KeySourceUnavailable,

    /// A steady-state refresh failed; the previous snapshot was kept.
    #[error("key set refresh failed")]
    RefreshFailed,
}

impl AuthFailure {
    /// Machine-readable reason code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::MissingHeader => "MISSING_AUTHORIZATION",
            AuthFailure::MalformedHeader => "MALFORMED_AUTHORIZATION",
            AuthFailure::MalformedToken => "MALFORMED_TOKEN",
            AuthFailure::UnknownKey => "UNKNOWN_KEY",
            AuthFailure::InvalidSignature => "INVALID_SIGNATURE",
            AuthFailure::Expired => "TOKEN_EXPIRED",
            AuthFailure::InvalidClaims => "INVALID_CLAIMS",
            AuthFailure::MissingSubject => "MISSING_SUBJECT",
            AuthFailure::KeySourceUnavailable => "KEY_SOURCE_UNAVAILABLE",
            AuthFailure::RefreshFailed => "REFRESH_FAILED",
        }
    }

    /// Low-cardinality label for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            AuthFailure::MissingHeader => "missing_header",
            AuthFailure::MalformedHeader => "malformed_header",
            AuthFailure::MalformedToken => "malformed_token",
            AuthFailure::UnknownKey => "unknown_key",
            AuthFailure::InvalidSignature => "invalid_signature",
            AuthFailure::Expired => "expired",
            AuthFailure::InvalidClaims => "invalid_claims",
            AuthFailure::MissingSubject => "missing_subject",
            AuthFailure::KeySourceUnavailable => "key_source_unavailable",
            AuthFailure::RefreshFailed => "refresh_failed",
        }
    }
}
