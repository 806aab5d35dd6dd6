//! Shared persistence types for ThiCode
//!
//! This module provides the error type returned by every store implementation.

use crate::error::Error;
use thiserror::Error;

/// PostgreSQL SQLSTATE codes that indicate a transaction may succeed if retried
const TRANSIENT_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
];

/// Persistence-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Record already exists")]
    AlreadyExists,

    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Write refused because of the owning record's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl RepositoryError {
    /// Whether retrying the same operation could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            RepositoryError::Connection(sqlx::Error::PoolTimedOut)
            | RepositoryError::Connection(sqlx::Error::Io(_)) => true,
            RepositoryError::Connection(sqlx::Error::Database(db_err)) => db_err
                .code()
                .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref())),
            _ => false,
        }
    }
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Error::NotFound("Record not found".to_string()),
            RepositoryError::AlreadyExists => Error::Conflict("Record already exists".to_string()),
            RepositoryError::Connection(e) => Error::Database(e),
            RepositoryError::InvalidData(msg) | RepositoryError::InvalidState(msg) => {
                Error::Validation(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(RepositoryError::Connection(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn test_not_found_is_not_transient() {
        assert!(!RepositoryError::NotFound.is_transient());
        assert!(!RepositoryError::InvalidData("bad".to_string()).is_transient());
        assert!(!RepositoryError::InvalidState("archived".to_string()).is_transient());
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        assert!(!RepositoryError::Connection(sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn test_conversion_to_common_error() {
        let err: Error = RepositoryError::AlreadyExists.into();
        assert!(matches!(err, Error::Conflict(_)));

        let err: Error = RepositoryError::InvalidData("x".to_string()).into();
        assert!(matches!(err, Error::Validation(_)));

        let err: Error = RepositoryError::InvalidState("x".to_string()).into();
        assert!(matches!(err, Error::Validation(_)));
    }
}
