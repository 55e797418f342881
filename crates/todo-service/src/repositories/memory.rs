//! In-memory todos repository.
//!
//! Used when no `DATABASE_URL` is configured and by the test harness. Same
//! ownership rules as the Postgres store; data is lost on restart.

use crate::errors::ApiError;
use crate::models::Todo;
use crate::repositories::TodoRepository;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryTodoRepository {
    todos: RwLock<Vec<Todo>>,
    next_id: AtomicI64,
}

impl InMemoryTodoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TodoRepository for InMemoryTodoRepository {
    async fn list(&self, user_id: &str) -> Result<Vec<Todo>, ApiError> {
        let mut todos: Vec<Todo> = self
            .todos
            .read()
            .await
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        todos.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(todos)
    }

    async fn create(&self, user_id: &str, title: &str) -> Result<Todo, ApiError> {
        let todo = Todo {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            user_id: user_id.to_string(),
            title: title.to_string(),
            completed: false,
        };
        self.todos.write().await.push(todo.clone());
        tracing::debug!(target: "todo.repo.todos", todo_id = todo.id, "Todo created");
        Ok(todo)
    }

    async fn toggle(&self, user_id: &str, id: i64) -> Result<bool, ApiError> {
        let mut todos = self.todos.write().await;
        match todos
            .iter_mut()
            .find(|t| t.id == id && t.user_id == user_id)
        {
            Some(todo) => {
                todo.completed = !todo.completed;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, user_id: &str, id: i64) -> Result<bool, ApiError> {
        let mut todos = self.todos.write().await;
        let before = todos.len();
        todos.retain(|t| !(t.id == id && t.user_id == user_id));
        Ok(todos.len() != before)
    }

    async fn ping(&self) -> Result<(), ApiError> {
        Ok(())
    }
}
