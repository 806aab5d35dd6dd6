//! PostgreSQL store integration tests
//!
//! Run against a migrated database with
//! `DATABASE_URL=... cargo test -p thicode-integration-tests -- --ignored`.

#![allow(dead_code)]

mod common;
mod conversations;
mod messages;
