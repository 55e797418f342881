//! Bearer token authentication.
//!
//! # Components
//!
//! - `jwks` - Key set cache for the identity provider's published keys
//! - `jwt` - Token verification against the cached keys
//! - `claims` - Verified identity and typed claim access
//! - `failure` - Authentication failure taxonomy

pub mod claims;
pub mod failure;
pub mod jwks;
pub mod jwt;

pub use claims::VerifiedIdentity;
pub use failure::AuthFailure;
pub use jwks::{KeySetCache, KeySetOptions, RefreshOutcome};
pub use jwt::{TokenVerifier, VerifierOptions};
