//! Error taxonomy for the conversations domain

use thicode_cache::{CacheError, CircuitBreakerError, LockError, LockKey};
use thicode_common::{Error, RepositoryError, Retryable, StateError};
use thicode_llm::LlmError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ConversationError>;

#[derive(Error, Debug)]
pub enum ConversationError {
    /// Operation not allowed in the entity's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Reply would repeat the role of its parent's latest reply
    #[error("Message ordering violation: {0}")]
    OrderingViolation(String),

    /// Parent message missing or in another conversation
    #[error("Orphaned message: {0}")]
    OrphanedMessage(String),

    #[error("Another message is being created in conversation {0}")]
    ConcurrentMessage(Uuid),

    #[error("Resource is locked: {0}")]
    LockContention(String),

    #[error("Conversation conflict: {0}")]
    ConversationConflict(String),

    #[error("AI service error: {0}")]
    AiService(String),

    #[error("AI service unavailable: {0}")]
    AiUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Retryable for ConversationError {
    fn is_retryable(&self) -> bool {
        match self {
            ConversationError::ConcurrentMessage(_)
            | ConversationError::LockContention(_)
            | ConversationError::AiService(_)
            | ConversationError::Cache(_) => true,
            ConversationError::Repository(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<LockError> for ConversationError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Contention {
                key: LockKey::MessageCreation(conversation_id),
            } => ConversationError::ConcurrentMessage(conversation_id),
            LockError::Contention { key } => ConversationError::LockContention(key.to_string()),
            LockError::Cache(e) => ConversationError::Cache(e),
        }
    }
}

impl From<RepositoryError> for ConversationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::InvalidState(msg) => ConversationError::InvalidState(msg),
            other => ConversationError::Repository(other),
        }
    }
}

impl From<StateError> for ConversationError {
    fn from(err: StateError) -> Self {
        ConversationError::InvalidState(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ConversationError {
    fn from(err: validator::ValidationErrors) -> Self {
        ConversationError::Validation(err.to_string())
    }
}

impl From<CircuitBreakerError<LlmError>> for ConversationError {
    fn from(err: CircuitBreakerError<LlmError>) -> Self {
        match err {
            CircuitBreakerError::Open { failures } => ConversationError::AiUnavailable(format!(
                "circuit open after {} consecutive failures",
                failures
            )),
            CircuitBreakerError::Inner(e) if e.is_transient() => {
                ConversationError::AiService(e.to_string())
            }
            CircuitBreakerError::Inner(e) => ConversationError::Internal(e.to_string()),
            CircuitBreakerError::Cache(e) => ConversationError::Cache(e),
        }
    }
}

impl From<ConversationError> for Error {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::InvalidState(_)
            | ConversationError::OrderingViolation(_)
            | ConversationError::Validation(_) => Error::Validation(err.to_string()),
            ConversationError::OrphanedMessage(_)
            | ConversationError::ConcurrentMessage(_)
            | ConversationError::LockContention(_)
            | ConversationError::ConversationConflict(_) => Error::Conflict(err.to_string()),
            ConversationError::AiService(_) | ConversationError::AiUnavailable(_) => {
                Error::ServiceUnavailable(err.to_string())
            }
            ConversationError::NotFound(_) => Error::NotFound(err.to_string()),
            ConversationError::Repository(e) => e.into(),
            ConversationError::Cache(_) | ConversationError::Internal(_) => {
                Error::Internal(err.to_string())
            }
        }
    }
}
