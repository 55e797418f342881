//! Repository layer for the todo service.
//!
//! Handlers talk to `dyn TodoRepository`. `PgTodoRepository` is the
//! production store; `InMemoryTodoRepository` backs local runs without a
//! database and the test harness.

pub mod memory;
pub mod todos;

pub use memory::InMemoryTodoRepository;
pub use todos::{PgTodoRepository, TodoRepository};
