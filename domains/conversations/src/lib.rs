//! Conversations domain: chat threads, messages and AI exchanges

pub mod domain;
pub mod repository;
pub mod service;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{
    slugify, title_from_content, Conversation, ConversationStatus, Message, MessageRole,
    MessageStatus, DEFAULT_TITLE,
};
pub use domain::errors::{ConversationError, Result};
pub use domain::state::{
    ConversationEvent, ConversationState, ConversationStateMachine, MessageEvent, MessageState,
    MessageStateMachine, StateError,
};

// Re-export repository types
pub use repository::{
    ConversationFilter, ConversationRepository, ConversationStore, InMemoryConversationStore,
    MessageRepository, PgConversationStore,
};

// Re-export services
pub use service::{
    ChatService, ConversationService, Exchange, MessageService, MetadataUpdate, NewConversation,
    NewMessage, Thread,
};
