//! Repository implementations for Conversations domain
//!
//! [`ConversationStore`] is the persistence boundary used by the services.
//! Multi-row writes (insert a message and refresh the conversation's derived
//! stats, delete a message and detach its replies) are single store calls so
//! each backend can make them atomic.

pub mod conversations;
pub mod memory;
pub mod messages;
pub mod transactions;

use sqlx::{PgPool, Postgres, Transaction};
use thicode_common::RepositoryError;
use uuid::Uuid;

use crate::domain::entities::{Conversation, ConversationStatus, Message, MessageRole, MessageStatus};

pub use conversations::ConversationRepository;
pub use memory::InMemoryConversationStore;
pub use messages::MessageRepository;

pub type StoreResult<T> = std::result::Result<T, RepositoryError>;

/// Conversation listing filter
#[derive(Debug, Clone)]
pub struct ConversationFilter {
    pub user_id: Uuid,
    /// Status to list; active when unset
    pub status: Option<ConversationStatus>,
    pub category: Option<String>,
    /// Case-insensitive match on title, summary or any message content
    pub search: Option<String>,
}

impl ConversationFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id,
            status: None,
            category: None,
            search: None,
        }
    }
}

#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, conversation: &Conversation) -> StoreResult<Conversation>;

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>>;

    /// Pinned first, then most recent activity
    async fn list_conversations(&self, filter: &ConversationFilter)
        -> StoreResult<Vec<Conversation>>;

    /// Persist the mutable conversation fields. Derived message stats are
    /// left untouched.
    async fn update_conversation(&self, conversation: &Conversation) -> StoreResult<Conversation>;

    /// Hard delete, cascading to messages
    async fn delete_conversation(&self, id: Uuid) -> StoreResult<bool>;

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>>;

    /// Messages of a conversation, oldest first
    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;

    /// Direct replies to `parent_id`, oldest first
    async fn list_replies(&self, parent_id: Uuid) -> StoreResult<Vec<Message>>;

    /// Most recent direct reply to `parent_id`
    async fn latest_reply(&self, parent_id: Uuid) -> StoreResult<Option<Message>>;

    /// Most recent message of a conversation, optionally of one role
    async fn latest_message(
        &self,
        conversation_id: Uuid,
        role: Option<MessageRole>,
    ) -> StoreResult<Option<Message>>;

    /// Oldest message of `role` in a conversation
    async fn first_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
    ) -> StoreResult<Option<Message>>;

    async fn count_messages_with_status(
        &self,
        conversation_id: Uuid,
        status: MessageStatus,
    ) -> StoreResult<i64>;

    /// Insert a message and recompute `message_count` / `last_message_at`
    /// of its conversation atomically. Fails with
    /// [`RepositoryError::InvalidState`] unless the conversation is active.
    async fn insert_message(&self, message: &Message) -> StoreResult<(Message, Conversation)>;

    /// Persist content, status and edit fields of a message
    async fn update_message(&self, message: &Message) -> StoreResult<Message>;

    /// Delete a message, clear its replies' parent reference and recompute
    /// the conversation stats atomically.
    async fn delete_message(&self, id: Uuid) -> StoreResult<Conversation>;

    /// Clear parent references that point outside `conversation_id`.
    /// Returns the number of repaired messages.
    async fn clear_foreign_parents(&self, conversation_id: Uuid) -> StoreResult<u64>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
    pub conversations: ConversationRepository,
    pub messages: MessageRepository,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            conversations: ConversationRepository::new(pool.clone()),
            messages: MessageRepository::new(pool.clone()),
            pool,
        }
    }

    /// Begin a new database transaction.
    pub async fn begin(&self) -> std::result::Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ConversationStore for PgConversationStore {
    async fn create_conversation(&self, conversation: &Conversation) -> StoreResult<Conversation> {
        self.conversations.create(conversation).await
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        self.conversations.find(id).await
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> StoreResult<Vec<Conversation>> {
        self.conversations.list(filter).await
    }

    async fn update_conversation(&self, conversation: &Conversation) -> StoreResult<Conversation> {
        self.conversations
            .update(conversation)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn delete_conversation(&self, id: Uuid) -> StoreResult<bool> {
        self.conversations.delete(id).await
    }

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        self.messages.find(id).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        self.messages.list_by_conversation(conversation_id).await
    }

    async fn list_replies(&self, parent_id: Uuid) -> StoreResult<Vec<Message>> {
        self.messages.list_replies(parent_id).await
    }

    async fn latest_reply(&self, parent_id: Uuid) -> StoreResult<Option<Message>> {
        self.messages.latest_reply(parent_id).await
    }

    async fn latest_message(
        &self,
        conversation_id: Uuid,
        role: Option<MessageRole>,
    ) -> StoreResult<Option<Message>> {
        self.messages.latest(conversation_id, role).await
    }

    async fn first_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
    ) -> StoreResult<Option<Message>> {
        self.messages.first_by_role(conversation_id, role).await
    }

    async fn count_messages_with_status(
        &self,
        conversation_id: Uuid,
        status: MessageStatus,
    ) -> StoreResult<i64> {
        self.messages.count_with_status(conversation_id, status).await
    }

    async fn insert_message(&self, message: &Message) -> StoreResult<(Message, Conversation)> {
        let mut tx = self.begin().await?;

        let status = transactions::lock_conversation_tx(&mut tx, message.conversation_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if status != ConversationStatus::Active {
            return Err(RepositoryError::InvalidState(format!(
                "cannot add messages to a {} conversation",
                status
            )));
        }
        let created = transactions::create_message_tx(&mut tx, message).await?;
        let conversation =
            transactions::refresh_message_stats_tx(&mut tx, message.conversation_id).await?;

        tx.commit().await?;
        Ok((created, conversation))
    }

    async fn update_message(&self, message: &Message) -> StoreResult<Message> {
        self.messages
            .update(message)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn delete_message(&self, id: Uuid) -> StoreResult<Conversation> {
        let mut tx = self.begin().await?;

        let conversation_id = transactions::message_conversation_tx(&mut tx, id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        transactions::lock_conversation_tx(&mut tx, conversation_id).await?;
        transactions::detach_replies_tx(&mut tx, id).await?;
        transactions::delete_message_tx(&mut tx, id).await?;
        let conversation = transactions::refresh_message_stats_tx(&mut tx, conversation_id).await?;

        tx.commit().await?;
        Ok(conversation)
    }

    async fn clear_foreign_parents(&self, conversation_id: Uuid) -> StoreResult<u64> {
        self.messages.clear_foreign_parents(conversation_id).await
    }
}
