//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks the key set and the repository

use crate::models::{ReadinessResponse, StatusResponse};
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler. Checks no dependencies.
pub async fn health_check() -> Json<StatusResponse> {
    Json(StatusResponse::new("ok"))
}

/// Readiness probe handler.
///
/// Ready when the cached key set has at least one key and the repository
/// answers. Returns 200 if ready, 503 if not.
///
/// Failure details are logged server-side; the response only says which
/// dependency is down.
#[tracing::instrument(skip_all, name = "todo.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let key_set = state.verifier.key_cache().snapshot().await;

    if key_set.is_empty() {
        tracing::warn!("Readiness check failed: key set is empty");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                key_set: Some("empty"),
                database: None,
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    if let Err(e) = state.todos.ping().await {
        tracing::warn!("Readiness check failed: repository error: {}", e);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                key_set: Some("loaded"),
                database: Some("unhealthy"),
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            key_set: Some("loaded"),
            database: Some("healthy"),
            error: None,
        }),
    )
}
