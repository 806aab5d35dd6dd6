//! Message service: status transitions, edits, deletes and threads

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use thicode_cache::{LockKey, LockManager};
use uuid::Uuid;

use crate::domain::entities::{Conversation, Message, MessageRole};
use crate::domain::errors::{ConversationError, Result};
use crate::domain::state::MessageEvent;
use crate::repository::ConversationStore;

/// A message with its ancestor chain and direct replies
#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    /// Root first
    pub ancestors: Vec<Message>,
    pub message: Message,
    /// Oldest first
    pub replies: Vec<Message>,
}

#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn ConversationStore>,
    locks: LockManager,
}

impl MessageService {
    pub fn new(store: Arc<dyn ConversationStore>, locks: LockManager) -> Self {
        Self { store, locks }
    }

    pub async fn get_message(&self, id: Uuid) -> Result<Message> {
        self.store
            .find_message(id)
            .await?
            .ok_or_else(|| ConversationError::NotFound(format!("Message {}", id)))
    }

    /// Messages of a conversation, oldest first
    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        Ok(self.store.list_messages(conversation_id).await?)
    }

    /// Most recent message, optionally restricted to one role
    pub async fn latest_message(
        &self,
        conversation_id: Uuid,
        role: Option<MessageRole>,
    ) -> Result<Option<Message>> {
        Ok(self.store.latest_message(conversation_id, role).await?)
    }

    pub async fn mark_delivered(&self, id: Uuid) -> Result<Message> {
        self.transition(id, MessageEvent::Deliver).await
    }

    pub async fn mark_failed(&self, id: Uuid) -> Result<Message> {
        self.transition(id, MessageEvent::Fail).await
    }

    async fn transition(&self, id: Uuid, event: MessageEvent) -> Result<Message> {
        let conversation_id = self.get_message(id).await?.conversation_id;

        self.locks
            .with_lock(
                LockKey::Message {
                    conversation_id,
                    message_id: id,
                },
                || async move {
                    // A terminal status written since the first read must win
                    let mut message = self.get_message(id).await?;
                    message.apply(event)?;
                    let saved = self.store.update_message(&message).await?;
                    tracing::debug!(message_id = %id, status = %saved.status, "Message status updated");
                    Ok(saved)
                },
            )
            .await
    }

    /// Replace a message's content in an active conversation
    pub async fn edit_message(&self, id: Uuid, content: String) -> Result<Message> {
        let message = self.get_message(id).await?;
        let conversation_id = message.conversation_id;

        self.locks
            .with_lock(
                LockKey::Message {
                    conversation_id,
                    message_id: id,
                },
                || async move {
                    self.ensure_active(conversation_id).await?;

                    // Reload under the lock so concurrent edits are counted
                    let mut message = self.get_message(id).await?;
                    message.edit(content)?;
                    let saved = self.store.update_message(&message).await?;

                    tracing::info!(
                        message_id = %id,
                        edit_count = saved.edit_count,
                        "Message edited"
                    );
                    Ok(saved)
                },
            )
            .await
    }

    /// Delete a message, detaching its replies. Returns the conversation with
    /// refreshed stats.
    pub async fn delete_message(&self, id: Uuid) -> Result<Conversation> {
        let message = self.get_message(id).await?;
        let conversation_id = message.conversation_id;

        self.locks
            .with_lock(LockKey::MessageCreation(conversation_id), || async move {
                self.ensure_active(conversation_id).await?;
                let conversation = self.store.delete_message(id).await?;

                tracing::info!(
                    conversation_id = %conversation_id,
                    message_id = %id,
                    message_count = conversation.message_count,
                    "Message deleted"
                );
                Ok(conversation)
            })
            .await
    }

    /// Load a message with its ancestors and replies
    pub async fn get_thread(&self, id: Uuid) -> Result<Thread> {
        let message = self.get_message(id).await?;

        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([message.id]);
        let mut next = message.parent_id;
        while let Some(parent_id) = next {
            if !seen.insert(parent_id) {
                tracing::warn!(message_id = %id, parent_id = %parent_id, "Cycle in message parents");
                break;
            }
            let Some(parent) = self.store.find_message(parent_id).await? else {
                break;
            };
            next = parent.parent_id;
            ancestors.push(parent);
        }
        ancestors.reverse();

        let replies = self.store.list_replies(id).await?;

        Ok(Thread {
            ancestors,
            message,
            replies,
        })
    }

    async fn ensure_active(&self, conversation_id: Uuid) -> Result<()> {
        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await?
            .ok_or_else(|| ConversationError::NotFound(format!("Conversation {}", conversation_id)))?;

        if !conversation.is_active() {
            return Err(ConversationError::InvalidState(format!(
                "conversation {} is {}",
                conversation_id, conversation.status
            )));
        }
        Ok(())
    }
}
