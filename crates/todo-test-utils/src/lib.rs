//! # Todo Test Utilities
//!
//! Shared test utilities for the todo service.
//!
//! This crate provides:
//! - Deterministic Ed25519 keypairs that publish themselves as JWKs and sign
//!   tokens (`TestKeypair`)
//! - Claim builders (`valid_claims`, `TestTokenBuilder`, `tamper_payload`)
//! - A wiremock identity provider serving `/api/auth/jwks` (`MockJwksProvider`)
//! - A server harness running the real router (`TestTodoServer`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use todo_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let key = TestKeypair::new(1, "key-1");
//!     let provider = MockJwksProvider::start(&[&key]).await;
//!     let server = TestTodoServer::spawn(&provider.url()).await?;
//!
//!     let token = key.sign(&valid_claims("user-42"));
//!     // ... call server.url() with `Authorization: Bearer {token}`
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod server_harness;
pub mod token_builders;

pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use server_harness::*;
pub use token_builders::*;
