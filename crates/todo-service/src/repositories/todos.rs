//! Todos repository.
//!
//! Every operation takes the owner's user id and filters on it, so one user
//! can never read or change another user's rows.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)
//! - `user_id` always comes from the verified token subject

use crate::errors::ApiError;
use crate::models::Todo;
use crate::observability::metrics;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Instant;
use tracing::instrument;

/// Storage for todo items, scoped by owner.
#[async_trait::async_trait]
pub trait TodoRepository: Send + Sync {
    /// All of the user's todos, newest (highest id) first.
    async fn list(&self, user_id: &str) -> Result<Vec<Todo>, ApiError>;

    /// Insert a todo for the user. `title` is already validated.
    async fn create(&self, user_id: &str, title: &str) -> Result<Todo, ApiError>;

    /// Flip `completed`. Returns `false` if the user has no todo with this id.
    async fn toggle(&self, user_id: &str, id: i64) -> Result<bool, ApiError>;

    /// Delete a todo. Returns `false` if the user has no todo with this id.
    async fn delete(&self, user_id: &str, id: i64) -> Result<bool, ApiError>;

    /// Check that the store answers.
    async fn ping(&self) -> Result<(), ApiError>;
}

/// PostgreSQL-backed repository over the `todos` table.
pub struct PgTodoRepository {
    pool: PgPool,
}

impl PgTodoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_row_to_todo(row: &PgRow) -> Result<Todo, sqlx::Error> {
    Ok(Todo {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        completed: row.try_get("completed")?,
    })
}

/// Record the query outcome and convert the error.
fn observe<T>(
    operation: &'static str,
    start: Instant,
    result: Result<T, sqlx::Error>,
) -> Result<T, ApiError> {
    match result {
        Ok(value) => {
            metrics::record_db_query(operation, "success", start.elapsed());
            Ok(value)
        }
        Err(e) => {
            metrics::record_db_query(operation, "error", start.elapsed());
            tracing::warn!(target: "todo.repo.todos", operation, error = %e, "Query failed");
            Err(ApiError::from(e))
        }
    }
}

#[async_trait::async_trait]
impl TodoRepository for PgTodoRepository {
    #[instrument(skip_all, name = "todo.repo.list_todos")]
    async fn list(&self, user_id: &str) -> Result<Vec<Todo>, ApiError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, completed
            FROM todos
            WHERE user_id = $1
            ORDER BY id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .and_then(|rows| rows.iter().map(map_row_to_todo).collect::<Result<Vec<_>, _>>());

        observe("list_todos", start, rows)
    }

    #[instrument(skip_all, name = "todo.repo.create_todo")]
    async fn create(&self, user_id: &str, title: &str) -> Result<Todo, ApiError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO todos (user_id, title)
            VALUES ($1, $2)
            RETURNING id, user_id, title, completed
            "#,
        )
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .and_then(|row| map_row_to_todo(&row));

        let todo = observe("create_todo", start, row)?;
        tracing::debug!(target: "todo.repo.todos", todo_id = todo.id, "Todo created");
        Ok(todo)
    }

    #[instrument(skip_all, name = "todo.repo.toggle_todo", fields(todo_id = id))]
    async fn toggle(&self, user_id: &str, id: i64) -> Result<bool, ApiError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            UPDATE todos
            SET completed = NOT completed
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await;

        Ok(observe("toggle_todo", start, result)?.rows_affected() > 0)
    }

    #[instrument(skip_all, name = "todo.repo.delete_todo", fields(todo_id = id))]
    async fn delete(&self, user_id: &str, id: i64) -> Result<bool, ApiError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            DELETE FROM todos
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await;

        Ok(observe("delete_todo", start, result)?.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), ApiError> {
        let start = Instant::now();
        let result = sqlx::query("SELECT 1").fetch_one(&self.pool).await;
        observe("ping", start, result).map(|_| ())
    }
}
