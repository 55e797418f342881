//! Verified identity and typed access to token claims.
//!
//! Claims arrive as an untyped JSON object. `TokenClaims` pulls the fields the
//! verifier relies on out of it with explicit failure kinds, and
//! `VerifiedIdentity` is what handlers receive. The subject is redacted in
//! Debug output to keep user identifiers out of logs.

use crate::auth::failure::AuthFailure;
use serde_json::{Map, Value};
use std::fmt;

/// Raw claim set of a verified token.
pub type ClaimSet = Map<String, Value>;

/// Typed view over a decoded claim set.
pub struct TokenClaims<'a> {
    raw: &'a ClaimSet,
}

impl<'a> TokenClaims<'a> {
    pub fn new(raw: &'a ClaimSet) -> Self {
        Self { raw }
    }

    /// The `sub` claim.
    ///
    /// # Errors
    ///
    /// `MissingSubject` if absent, not a string, or empty.
    pub fn subject(&self) -> Result<&'a str, AuthFailure> {
        match self.raw.get("sub") {
            Some(Value::String(sub)) if !sub.is_empty() => Ok(sub),
            _ => Err(AuthFailure::MissingSubject),
        }
    }

    /// The `iat` claim, if present.
    ///
    /// # Errors
    ///
    /// `Expired` if present but not an integer timestamp.
    pub fn issued_at(&self) -> Result<Option<i64>, AuthFailure> {
        self.timestamp("iat")
    }

    /// The `exp` claim, if present.
    ///
    /// # Errors
    ///
    /// `Expired` if present but not an integer timestamp.
    pub fn expires_at(&self) -> Result<Option<i64>, AuthFailure> {
        self.timestamp("exp")
    }

    fn timestamp(&self, name: &str) -> Result<Option<i64>, AuthFailure> {
        match self.raw.get(name) {
            None => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or(AuthFailure::Expired),
        }
    }
}

/// Identity established by a successfully verified token.
///
/// Only the token verifier constructs this. Handlers use
/// [`VerifiedIdentity::subject`] as the owner key for every resource; a
/// caller-supplied user id is never accepted in its place.
#[derive(Clone)]
pub struct VerifiedIdentity {
    subject: String,
    claims: ClaimSet,
}

impl VerifiedIdentity {
    pub(crate) fn from_claims(claims: ClaimSet) -> Result<Self, AuthFailure> {
        let subject = TokenClaims::new(&claims).subject()?.to_string();
        Ok(Self { subject, claims })
    }

    /// Subject identifier (the user id at the identity provider).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Full verified claim set.
    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// A claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

impl fmt::Debug for VerifiedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedIdentity")
            .field("subject", &"[REDACTED]")
            .field("claim_names", &self.claims.keys().collect::<Vec<_>>())
            .finish()
    }
}
