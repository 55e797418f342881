//! Todo service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! returned to clients are generic; the underlying cause is logged
//! server-side.

use crate::auth::failure::{AuthFailure, GENERIC_AUTH_MESSAGE};
use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// `WWW-Authenticate` challenge sent with every 401.
pub const WWW_AUTHENTICATE_CHALLENGE: &str = "Bearer realm=\"todo-api\", error=\"invalid_token\"";

/// Todo service error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401 (reason code in body, generic message)
/// - BadRequest: 400
/// - NotFound: 404
/// - Database: 500
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(AuthFailure),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            ApiError::Unauthorized(failure) => (failure.code(), GENERIC_AUTH_MESSAGE.to_string()),
            ApiError::BadRequest(reason) => ("BAD_REQUEST", reason.clone()),
            ApiError::NotFound(resource) => ("NOT_FOUND", resource.clone()),
            ApiError::Database(err) => {
                tracing::error!(target: "todo.database", error = %err, "Database operation failed");
                (
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_CHALLENGE),
            );
        }

        response
    }
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        ApiError::Unauthorized(failure)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ApiError::Unauthorized(AuthFailure::Expired).to_string(),
            "Unauthorized: token expired or not yet valid"
        );
        assert_eq!(
            ApiError::BadRequest("title must not be empty".to_string()).to_string(),
            "Bad request: title must not be empty"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Unauthorized(AuthFailure::MissingHeader).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::BadRequest("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Database("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_unauthorized_response_shape() {
        let response = ApiError::Unauthorized(AuthFailure::UnknownKey).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"todo-api\", error=\"invalid_token\""
        );

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "UNKNOWN_KEY");
        assert_eq!(body_json["error"]["message"], GENERIC_AUTH_MESSAGE);
    }

    #[tokio::test]
    async fn test_unauthorized_message_is_identical_for_every_reason() {
        let mut messages = Vec::new();
        for failure in [
            AuthFailure::MissingHeader,
            AuthFailure::MalformedToken,
            AuthFailure::InvalidSignature,
            AuthFailure::Expired,
            AuthFailure::MissingSubject,
        ] {
            let body_json = read_body_json(ApiError::from(failure).into_response().into_body()).await;
            messages.push(body_json["error"]["message"].clone());
        }
        messages.dedup();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_database_error_is_generic() {
        let response = ApiError::Database("relation \"todos\" does not exist".to_string())
            .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "DATABASE_ERROR");
        assert_eq!(
            body_json["error"]["message"],
            "An internal database error occurred"
        );
    }

    #[tokio::test]
    async fn test_bad_request_and_not_found_carry_reason() {
        let body_json = read_body_json(
            ApiError::BadRequest("invalid todo id".to_string())
                .into_response()
                .into_body(),
        )
        .await;
        assert_eq!(body_json["error"]["code"], "BAD_REQUEST");
        assert_eq!(body_json["error"]["message"], "invalid todo id");

        let body_json = read_body_json(
            ApiError::NotFound("todo not found".to_string())
                .into_response()
                .into_body(),
        )
        .await;
        assert_eq!(body_json["error"]["code"], "NOT_FOUND");
    }
}
