//! Todo service library.
//!
//! A small todo API whose only interesting part is authentication: every
//! `/api` request carries a bearer JWT issued by an external identity
//! provider, verified against the provider's published key set (JWKS).
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> handlers/*.rs -> repositories/*.rs
//!                        |
//!                  auth/jwt.rs -> auth/jwks.rs (key set cache)
//! ```
//!
//! # Modules
//!
//! - `auth` - Key set cache, token verifier, failure taxonomy
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Bearer authentication and HTTP metrics
//! - `models` - Data models
//! - `observability` - Metrics
//! - `repositories` - Todo storage
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
