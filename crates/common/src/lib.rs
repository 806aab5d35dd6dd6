//! Shared utilities, configuration, and error handling for ThiCode
//!
//! This crate provides common functionality used across the ThiCode workspace:
//! - Configuration management following 12-factor principles
//! - Error types and their transport status mapping
//! - Tracing subscriber setup
//! - The retry policy used around fallible operations

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod retry;
pub mod state;

pub use db::RepositoryError;
pub use error::{Error, Result};
pub use retry::{Retryable, RetryPolicy};
pub use state::StateError;
