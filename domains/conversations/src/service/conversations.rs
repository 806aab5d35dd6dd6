//! Conversation service: lifecycle, message creation and metadata

use std::sync::Arc;

use thicode_cache::{LockKey, LockManager};
use thicode_common::RetryPolicy;
use uuid::Uuid;
use validator::Validate;

use super::{MetadataUpdate, NewConversation, NewMessage};
use crate::domain::entities::{
    title_from_content, Conversation, Message, MessageRole, MessageStatus, DEFAULT_TITLE,
};
use crate::domain::errors::{ConversationError, Result};
use crate::domain::state::{ConversationEvent, MessageEvent};
use crate::repository::{ConversationFilter, ConversationStore};

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    locks: LockManager,
    retry: RetryPolicy,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ConversationStore>, locks: LockManager, retry: RetryPolicy) -> Self {
        Self {
            store,
            locks,
            retry,
        }
    }

    pub async fn create_conversation(&self, input: NewConversation) -> Result<Conversation> {
        input.validate()?;

        let conversation = Conversation::new(input.user_id, input.title, input.category, input.tags)?;
        let created = self.store.create_conversation(&conversation).await?;

        tracing::info!(
            conversation_id = %created.id,
            user_id = %created.user_id,
            "Conversation created"
        );
        Ok(created)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Conversation> {
        self.store
            .find_conversation(id)
            .await?
            .ok_or_else(|| ConversationError::NotFound(format!("Conversation {}", id)))
    }

    pub async fn list_conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        Ok(self.store.list_conversations(filter).await?)
    }

    /// Add a message to an active conversation.
    ///
    /// Lock contention and transient store failures are retried; state,
    /// orphan and ordering failures are returned as-is.
    pub async fn add_message(&self, conversation_id: Uuid, input: NewMessage) -> Result<Message> {
        input.validate()?;
        self.retry
            .run("add_message", || self.try_add_message(conversation_id, &input))
            .await
    }

    async fn try_add_message(&self, conversation_id: Uuid, input: &NewMessage) -> Result<Message> {
        let conversation = self.get_conversation(conversation_id).await?;
        if !conversation.is_active() {
            return Err(ConversationError::InvalidState(format!(
                "cannot add messages to a {} conversation",
                conversation.status
            )));
        }

        let parent = match input.parent_id {
            Some(parent_id) => {
                let parent = self.store.find_message(parent_id).await?.ok_or_else(|| {
                    ConversationError::OrphanedMessage(format!(
                        "parent message {} does not exist",
                        parent_id
                    ))
                })?;
                if parent.conversation_id != conversation_id {
                    return Err(ConversationError::OrphanedMessage(format!(
                        "parent message {} belongs to another conversation",
                        parent_id
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        let mut message = Message::new(
            conversation_id,
            input.parent_id,
            input.role,
            input.content.clone(),
            input.content_type.clone(),
            input.metadata.clone(),
        )?;

        self.locks
            .with_lock(LockKey::MessageCreation(conversation_id), || async move {
                if let Some(parent) = &parent {
                    if let Some(latest) = self.store.latest_reply(parent.id).await? {
                        if latest.role == message.role {
                            return Err(ConversationError::OrderingViolation(format!(
                                "message {} already has a {} reply",
                                parent.id, latest.role
                            )));
                        }
                    }
                }

                message.apply(MessageEvent::Send)?;
                let (saved, conversation) = self.store.insert_message(&message).await?;

                tracing::info!(
                    conversation_id = %conversation.id,
                    message_id = %saved.id,
                    role = %saved.role,
                    message_count = conversation.message_count,
                    "Message added"
                );
                Ok(saved)
            })
            .await
    }

    /// Archive an active conversation with no pending messages
    pub async fn archive_conversation(&self, id: Uuid) -> Result<Conversation> {
        self.locks
            .with_lock(LockKey::Conversation(id), || async move {
                let mut conversation = self.get_live_conversation(id).await?;

                let pending = self
                    .store
                    .count_messages_with_status(id, MessageStatus::Pending)
                    .await?;
                if pending > 0 {
                    return Err(ConversationError::ConversationConflict(format!(
                        "conversation {} has {} pending messages",
                        id, pending
                    )));
                }

                conversation.apply(ConversationEvent::Archive)?;
                let saved = self.store.update_conversation(&conversation).await?;

                tracing::info!(conversation_id = %id, "Conversation archived");
                Ok(saved)
            })
            .await
    }

    /// Reactivate a conversation, repairing parent references that point
    /// into other conversations first.
    pub async fn restore_conversation(&self, id: Uuid) -> Result<Conversation> {
        self.locks
            .with_lock(LockKey::Conversation(id), || async move {
                let mut conversation = self.get_live_conversation(id).await?;

                let repaired = self.store.clear_foreign_parents(id).await?;
                if repaired > 0 {
                    tracing::warn!(conversation_id = %id, repaired, "Cleared orphaned parent references");
                }

                if conversation.is_active() {
                    return Ok(conversation);
                }

                conversation.apply(ConversationEvent::Restore)?;
                let saved = self.store.update_conversation(&conversation).await?;

                tracing::info!(conversation_id = %id, "Conversation restored");
                Ok(saved)
            })
            .await
    }

    /// Apply the provided metadata fields
    pub async fn update_metadata(&self, id: Uuid, update: MetadataUpdate) -> Result<Conversation> {
        update.validate()?;

        self.locks
            .with_lock(LockKey::Conversation(id), || async move {
                let mut conversation = self.get_live_conversation(id).await?;

                if let Some(summary) = update.summary {
                    conversation.summary = Some(summary);
                }
                if let Some(category) = update.category {
                    conversation.category = Some(category);
                }
                if let Some(tags) = update.tags {
                    conversation.tags = tags;
                }
                if let Some(is_pinned) = update.is_pinned {
                    conversation.is_pinned = is_pinned;
                }

                let saved = self.store.update_conversation(&conversation).await?;
                tracing::info!(conversation_id = %id, "Conversation metadata updated");
                Ok(saved)
            })
            .await
    }

    /// Title from the first user message, or the default title when there is none
    pub async fn generate_title(&self, id: Uuid) -> Result<String> {
        let first = self.store.first_message(id, MessageRole::User).await?;
        Ok(first
            .map(|m| title_from_content(&m.content))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()))
    }

    /// Set the title, generating one when `title` is `None`
    pub async fn update_title(&self, id: Uuid, title: Option<String>) -> Result<Conversation> {
        self.locks
            .with_lock(LockKey::Conversation(id), || async move {
                let mut conversation = self.get_live_conversation(id).await?;

                let title = match title {
                    Some(title) => title,
                    None => self.generate_title(id).await?,
                };
                conversation.set_title(&title)?;

                let saved = self.store.update_conversation(&conversation).await?;
                tracing::info!(conversation_id = %id, title = %saved.title, "Conversation title updated");
                Ok(saved)
            })
            .await
    }

    /// Hard delete a conversation and its messages
    pub async fn delete_conversation(&self, id: Uuid) -> Result<()> {
        self.locks
            .with_lock(LockKey::Conversation(id), || async move {
                let mut conversation = self.get_conversation(id).await?;
                conversation.apply(ConversationEvent::Delete)?;

                if !self.store.delete_conversation(id).await? {
                    return Err(ConversationError::NotFound(format!("Conversation {}", id)));
                }

                tracing::info!(conversation_id = %id, "Conversation deleted");
                Ok(())
            })
            .await
    }

    async fn get_live_conversation(&self, id: Uuid) -> Result<Conversation> {
        let conversation = self.get_conversation(id).await?;
        if conversation.is_deleted() {
            return Err(ConversationError::InvalidState(format!(
                "conversation {} is deleted",
                id
            )));
        }
        Ok(conversation)
    }
}
