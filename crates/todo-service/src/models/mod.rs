//! Todo service models.
//!
//! Request/response bodies and the todo row.

use serde::{Deserialize, Serialize};

/// A todo item owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,

    /// Subject of the token that created the item.
    pub user_id: String,

    pub title: String,

    pub completed: bool,
}

/// Body of `POST /api/todos`. Ownership comes from the token, never the body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTodoRequest {
    pub title: String,
}

/// `{"status": "..."}` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    /// Key set state ("loaded" or "empty").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_set: Option<&'static str>,

    /// Repository state ("healthy" or "unhealthy").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
