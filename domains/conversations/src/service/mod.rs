//! Service layer for the Conversations domain
//!
//! Every mutation goes through these services: they take the cache-backed
//! locks, enforce the status and ordering rules, and let the store persist
//! the result atomically.

pub mod chat;
pub mod conversations;
pub mod messages;

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::entities::MessageRole;

pub use chat::{ChatService, Exchange};
pub use conversations::ConversationService;
pub use messages::{MessageService, Thread};

/// Input for [`ConversationService::create_conversation`]
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewConversation {
    pub user_id: Uuid,
    #[validate(length(max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub tags: Vec<String>,
}

impl NewConversation {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }
}

/// Input for [`ConversationService::add_message`]
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMessage {
    pub role: MessageRole,
    #[validate(length(min = 1, max = 100_000))]
    pub content: String,
    pub parent_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50))]
    pub content_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            parent_id: None,
            content_type: None,
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn with_parent(mut self, parent_id: Option<Uuid>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Input for [`ConversationService::update_metadata`]; unset fields are kept
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MetadataUpdate {
    #[validate(length(max = 2000))]
    pub summary: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(length(max = 20))]
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}
