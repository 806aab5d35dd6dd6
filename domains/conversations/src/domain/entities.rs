//! Domain entities for the Conversations domain
//!
//! Conversations own messages; messages form a reply tree through an optional
//! `parent_id` within the same conversation.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::domain::errors::{ConversationError, Result};
use crate::domain::state::{
    ConversationEvent, ConversationState, ConversationStateMachine, MessageEvent, MessageState,
    MessageStateMachine, StateError,
};

/// Title given to conversations before one is generated
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Maximum title length (varchar(255))
pub const MAX_TITLE_LENGTH: usize = 255;

/// Characters of the first user message kept in a generated title
pub const GENERATED_TITLE_LENGTH: usize = 50;

pub const DEFAULT_CONTENT_TYPE: &str = "text";

static SLUG_STRIP_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[^a-z0-9_\s-]").expect("slug strip regex is valid"));

static SLUG_DASH_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[-\s]+").expect("slug dash regex is valid"));

/// Conversation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "conversation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Archived,
    Deleted,
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Archived => write!(f, "archived"),
            ConversationStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl From<ConversationStatus> for ConversationState {
    fn from(status: ConversationStatus) -> Self {
        match status {
            ConversationStatus::Active => ConversationState::Active,
            ConversationStatus::Archived => ConversationState::Archived,
            ConversationStatus::Deleted => ConversationState::Deleted,
        }
    }
}

impl From<ConversationState> for ConversationStatus {
    fn from(state: ConversationState) -> Self {
        match state {
            ConversationState::Active => ConversationStatus::Active,
            ConversationState::Archived => ConversationStatus::Archived,
            ConversationState::Deleted => ConversationStatus::Deleted,
        }
    }
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    #[mutants::skip] // Only feeds log fields and error text
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Message delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Pending,
    Sent,
    Delivered,
    Error,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Error => write!(f, "error"),
        }
    }
}

impl From<MessageStatus> for MessageState {
    fn from(status: MessageStatus) -> Self {
        match status {
            MessageStatus::Pending => MessageState::Pending,
            MessageStatus::Sent => MessageState::Sent,
            MessageStatus::Delivered => MessageState::Delivered,
            MessageStatus::Error => MessageState::Error,
        }
    }
}

impl From<MessageState> for MessageStatus {
    fn from(state: MessageState) -> Self {
        match state {
            MessageState::Pending => MessageStatus::Pending,
            MessageState::Sent => MessageStatus::Sent,
            MessageState::Delivered => MessageStatus::Delivered,
            MessageState::Error => MessageStatus::Error,
        }
    }
}

/// Conversation entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub status: ConversationStatus,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub is_pinned: bool,
    /// Number of messages, recomputed by the store on every message write
    pub message_count: i32,
    /// `created_at` of the newest message
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set iff status is archived
    pub archived_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Create a new active conversation. A missing or blank title becomes
    /// [`DEFAULT_TITLE`].
    pub fn new(
        user_id: Uuid,
        title: Option<String>,
        category: Option<String>,
        tags: Vec<String>,
    ) -> Result<Self> {
        let title = match title.map(|t| t.trim().to_string()) {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_TITLE.to_string(),
        };
        validate_title(&title)?;

        let now = Utc::now();
        Ok(Conversation {
            id: Uuid::new_v4(),
            user_id,
            slug: slugify(&title),
            title,
            summary: None,
            status: ConversationStatus::default(),
            tags,
            category,
            is_pinned: false,
            message_count: 0,
            last_message_at: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }

    pub fn is_deleted(&self) -> bool {
        self.status == ConversationStatus::Deleted
    }

    /// Apply a status transition, keeping `archived_at` in step with it
    pub fn apply(&mut self, event: ConversationEvent) -> std::result::Result<(), StateError> {
        let next = ConversationStateMachine::transition(self.status.into(), event)?;
        let now = Utc::now();

        self.status = next.into();
        self.archived_at = match self.status {
            ConversationStatus::Archived => Some(now),
            _ => None,
        };
        self.updated_at = now;
        Ok(())
    }

    /// Replace the title and re-derive the slug
    pub fn set_title(&mut self, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ConversationError::Validation(
                "Title cannot be empty".to_string(),
            ));
        }
        validate_title(title)?;

        self.title = title.to_string();
        self.slug = slugify(title);
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ConversationError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

/// URL slug: lowercase ASCII words joined by single dashes. Accented
/// letters keep their base letter.
pub fn slugify(title: &str) -> String {
    let ascii: String = title.nfkd().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();
    let stripped = SLUG_STRIP_REGEX.replace_all(&lowered, "");
    let dashed = SLUG_DASH_REGEX.replace_all(stripped.trim(), "-");
    let slug = dashed.trim_matches(|c| c == '-' || c == '_');
    if slug.is_empty() {
        "conversation".to_string()
    } else {
        slug.to_string()
    }
}

/// Title derived from a message: its first 50 characters, trimmed, with
/// "..." when the raw content was longer than that.
pub fn title_from_content(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(GENERATED_TITLE_LENGTH).collect();
    let head = head.trim();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head.to_string()
    }
}

/// Message entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// Message this one replies to, always within the same conversation
    pub parent_id: Option<Uuid>,
    pub role: MessageRole,
    pub content: String,
    pub content_type: String,
    pub metadata: serde_json::Value,
    pub status: MessageStatus,
    pub is_edited: bool,
    pub edit_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a pending message
    pub fn new(
        conversation_id: Uuid,
        parent_id: Option<Uuid>,
        role: MessageRole,
        content: String,
        content_type: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self> {
        Self::validate_content(&content)?;

        let metadata = metadata.unwrap_or_else(|| serde_json::json!({}));
        if !metadata.is_object() {
            return Err(ConversationError::Validation(
                "Message metadata must be a JSON object".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Message {
            id: Uuid::new_v4(),
            conversation_id,
            parent_id,
            role,
            content,
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            metadata,
            status: MessageStatus::default(),
            is_edited: false,
            edit_count: 0,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        })
    }

    /// Apply a status transition; delivery stamps `delivered_at`
    pub fn apply(&mut self, event: MessageEvent) -> std::result::Result<(), StateError> {
        let next = MessageStateMachine::transition(self.status.into(), event)?;
        let now = Utc::now();

        self.status = next.into();
        if self.status == MessageStatus::Delivered {
            self.delivered_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Replace the content and record the edit
    pub fn edit(&mut self, content: String) -> Result<()> {
        Self::validate_content(&content)?;
        self.content = content;
        self.is_edited = true;
        self.edit_count = self.edit_count.saturating_add(1);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Validate message content (CHECK (length(trim(content)) > 0))
    fn validate_content(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(ConversationError::Validation(
                "Message content cannot be empty or whitespace-only".to_string(),
            ));
        }
        Ok(())
    }
}
