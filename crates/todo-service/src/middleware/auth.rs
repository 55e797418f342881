//! Bearer authentication for protected routes.
//!
//! `require_auth` pulls the token out of the `Authorization` header, hands it
//! to the token verifier and stores the resulting `VerifiedIdentity` in the
//! request extensions. Handlers behind it take `Extension<VerifiedIdentity>`
//! and never see an unauthenticated request.

use crate::auth::{AuthFailure, TokenVerifier, VerifiedIdentity};
use crate::errors::ApiError;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<TokenVerifier>,
}

/// Extract the raw token from `Authorization: Bearer <token>`.
///
/// The value must split on a single space into exactly two parts, the first
/// being `Bearer`. Anything else (extra spaces, other schemes, empty token)
/// is malformed.
///
/// # Errors
///
/// - `MissingHeader` if the header is absent or not visible ASCII
/// - `MalformedHeader` if the value is not exactly `Bearer <token>`
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthFailure> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "todo.middleware.auth", "Missing Authorization header");
            AuthFailure::MissingHeader
        })?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => {
            tracing::debug!(target: "todo.middleware.auth", "Invalid Authorization header format");
            Err(AuthFailure::MalformedHeader)
        }
    }
}

/// Authenticate a request from its headers.
///
/// # Errors
///
/// Any `AuthFailure` from header extraction or token verification.
pub async fn authenticate(
    headers: &HeaderMap,
    verifier: &TokenVerifier,
) -> Result<VerifiedIdentity, AuthFailure> {
    let token = extract_bearer_token(headers)?;
    verifier.verify(token).await
}

/// Authentication middleware for user tokens.
///
/// # Response
///
/// - 401 with a reason code if the request cannot be authenticated
/// - Otherwise runs the next handler with `VerifiedIdentity` in extensions
#[instrument(skip_all, name = "todo.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let identity = authenticate(req.headers(), &state.verifier)
        .await
        .map_err(|failure| {
            tracing::info!(
                target: "todo.middleware.auth",
                reason = failure.code(),
                "Request rejected"
            );
            ApiError::Unauthorized(failure)
        })?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
