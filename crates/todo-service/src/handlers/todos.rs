//! Todo handlers.
//!
//! All routes sit behind `require_auth`. The owner of every row read or
//! written is the verified token subject; request bodies only carry a title.

use crate::auth::VerifiedIdentity;
use crate::errors::ApiError;
use crate::models::{CreateTodoRequest, StatusResponse, Todo};
use crate::routes::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Maximum title length in characters.
pub const MAX_TITLE_LENGTH: usize = 500;

/// Handler for GET /api/todos
#[instrument(skip_all, name = "todo.handlers.list_todos")]
pub async fn list_todos(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<Json<Vec<Todo>>, ApiError> {
    let todos = state.todos.list(identity.subject()).await?;
    Ok(Json(todos))
}

/// Handler for POST /api/todos
///
/// # Response
///
/// - 201 `{"status":"ok"}`
/// - 400 if the body is not JSON or the title is empty after trimming
#[instrument(skip_all, name = "todo.handlers.create_todo")]
pub async fn create_todo(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<VerifiedIdentity>,
    payload: Result<Json<CreateTodoRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(target: "todo.handlers", error = %e, "Rejected create body");
        ApiError::BadRequest("Request body must be JSON with a title".to_string())
    })?;

    let title = validate_title(&request.title)?;
    state.todos.create(identity.subject(), title).await?;

    Ok((StatusCode::CREATED, Json(StatusResponse::new("ok"))))
}

/// Handler for PATCH /api/todos/:id/toggle
#[instrument(skip_all, name = "todo.handlers.toggle_todo")]
pub async fn toggle_todo(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = parse_todo_id(&id)?;

    if !state.todos.toggle(identity.subject(), id).await? {
        return Err(ApiError::NotFound("todo not found".to_string()));
    }

    Ok(Json(StatusResponse::new("toggled")))
}

/// Handler for DELETE /api/todos/:id
#[instrument(skip_all, name = "todo.handlers.delete_todo")]
pub async fn delete_todo(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = parse_todo_id(&id)?;

    if !state.todos.delete(identity.subject(), id).await? {
        return Err(ApiError::NotFound("todo not found".to_string()));
    }

    Ok(Json(StatusResponse::new("deleted")))
}

fn parse_todo_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("invalid id".to_string()))
}

fn validate_title(raw: &str) -> Result<&str, ApiError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title)
}
