//! Utilities shared across the todo service crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (header inspection, iat validation, key decoding)
pub mod jwt;
