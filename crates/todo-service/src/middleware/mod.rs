//! HTTP middleware for the todo service.
//!
//! # Components
//!
//! - `auth` - Bearer authentication for protected routes
//! - `http_metrics` - Request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{authenticate, extract_bearer_token, require_auth, AuthState};
pub use http_metrics::http_metrics_middleware;
