//! HTTP request handlers for the todo service.

pub mod health;
pub mod metrics;
pub mod todos;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use todos::{create_todo, delete_todo, list_todos, toggle_todo};
