//! In-memory conversation store
//!
//! Messages live in an arena keyed by id; the reply tree is the optional
//! `parent_id` on each entry. A monotonically increasing insertion number
//! breaks `created_at` ties so "latest" queries are deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thicode_common::RepositoryError;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConversationFilter, ConversationStore, StoreResult};
use crate::domain::entities::{Conversation, ConversationStatus, Message, MessageRole, MessageStatus};

#[derive(Debug, Clone)]
struct StoredMessage {
    seq: u64,
    message: Message,
}

#[derive(Debug, Default)]
struct State {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, StoredMessage>,
    next_seq: u64,
}

impl State {
    fn messages_of(&self, conversation_id: Uuid) -> impl Iterator<Item = &StoredMessage> {
        self.messages
            .values()
            .filter(move |m| m.message.conversation_id == conversation_id)
    }

    fn sorted(mut entries: Vec<&StoredMessage>) -> Vec<Message> {
        entries.sort_by_key(|m| (m.message.created_at, m.seq));
        entries.into_iter().map(|m| m.message.clone()).collect()
    }

    fn latest<'a>(entries: impl Iterator<Item = &'a StoredMessage>) -> Option<Message> {
        entries
            .max_by_key(|m| (m.message.created_at, m.seq))
            .map(|m| m.message.clone())
    }

    fn refresh_stats(&mut self, conversation_id: Uuid) -> StoreResult<Conversation> {
        let (count, last) = self
            .messages_of(conversation_id)
            .fold((0i32, None), |(count, last), m| {
                (count + 1, last.max(Some(m.message.created_at)))
            });

        let conversation = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        conversation.message_count = count;
        conversation.last_message_at = last;
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }
}

/// Store used by tests and local runs. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConversationStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_search(state: &State, conversation: &Conversation, needle: &str) -> bool {
    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);
    contains(&conversation.title)
        || conversation.summary.as_deref().is_some_and(contains)
        || state
            .messages_of(conversation.id)
            .any(|m| contains(&m.message.content))
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self, conversation: &Conversation) -> StoreResult<Conversation> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(&conversation.id) {
            return Err(RepositoryError::AlreadyExists);
        }
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation.clone())
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> StoreResult<Vec<Conversation>> {
        let state = self.state.read().await;
        let status = filter.status.unwrap_or(ConversationStatus::Active);
        let needle = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.user_id == filter.user_id && c.status == status)
            .filter(|c| {
                filter
                    .category
                    .as_ref()
                    .is_none_or(|category| c.category.as_ref() == Some(category))
            })
            .filter(|c| {
                needle
                    .as_deref()
                    .is_none_or(|needle| matches_search(&state, c, needle))
            })
            .cloned()
            .collect();

        conversations.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then_with(|| match (a.last_message_at, b.last_message_at) {
                    (Some(a), Some(b)) => b.cmp(&a),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(conversations)
    }

    async fn update_conversation(&self, conversation: &Conversation) -> StoreResult<Conversation> {
        let mut state = self.state.write().await;
        let stored = state
            .conversations
            .get_mut(&conversation.id)
            .ok_or(RepositoryError::NotFound)?;

        stored.title = conversation.title.clone();
        stored.slug = conversation.slug.clone();
        stored.summary = conversation.summary.clone();
        stored.status = conversation.status;
        stored.tags = conversation.tags.clone();
        stored.category = conversation.category.clone();
        stored.is_pinned = conversation.is_pinned;
        stored.archived_at = conversation.archived_at;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_conversation(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.conversations.remove(&id).is_none() {
            return Ok(false);
        }
        state.messages.retain(|_, m| m.message.conversation_id != id);

        // Parent references into the deleted conversation behave like ON DELETE SET NULL
        let dangling: Vec<Uuid> = state
            .messages
            .values()
            .filter(|m| {
                m.message
                    .parent_id
                    .is_some_and(|parent| !state.messages.contains_key(&parent))
            })
            .map(|m| m.message.id)
            .collect();
        for message_id in dangling {
            if let Some(entry) = state.messages.get_mut(&message_id) {
                entry.message.parent_id = None;
            }
        }
        Ok(true)
    }

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(&id)
            .map(|m| m.message.clone()))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(State::sorted(state.messages_of(conversation_id).collect()))
    }

    async fn list_replies(&self, parent_id: Uuid) -> StoreResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(State::sorted(
            state
                .messages
                .values()
                .filter(|m| m.message.parent_id == Some(parent_id))
                .collect(),
        ))
    }

    async fn latest_reply(&self, parent_id: Uuid) -> StoreResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(State::latest(
            state
                .messages
                .values()
                .filter(|m| m.message.parent_id == Some(parent_id)),
        ))
    }

    async fn latest_message(
        &self,
        conversation_id: Uuid,
        role: Option<MessageRole>,
    ) -> StoreResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(State::latest(
            state
                .messages_of(conversation_id)
                .filter(|m| role.is_none_or(|role| m.message.role == role)),
        ))
    }

    async fn first_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
    ) -> StoreResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state
            .messages_of(conversation_id)
            .filter(|m| m.message.role == role)
            .min_by_key(|m| (m.message.created_at, m.seq))
            .map(|m| m.message.clone()))
    }

    async fn count_messages_with_status(
        &self,
        conversation_id: Uuid,
        status: MessageStatus,
    ) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .messages_of(conversation_id)
            .filter(|m| m.message.status == status)
            .count() as i64)
    }

    async fn insert_message(&self, message: &Message) -> StoreResult<(Message, Conversation)> {
        let mut state = self.state.write().await;
        let status = state
            .conversations
            .get(&message.conversation_id)
            .map(|c| c.status)
            .ok_or(RepositoryError::NotFound)?;
        if status != ConversationStatus::Active {
            return Err(RepositoryError::InvalidState(format!(
                "cannot add messages to a {} conversation",
                status
            )));
        }
        if state.messages.contains_key(&message.id) {
            return Err(RepositoryError::AlreadyExists);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.messages.insert(
            message.id,
            StoredMessage {
                seq,
                message: message.clone(),
            },
        );

        let conversation = state.refresh_stats(message.conversation_id)?;
        Ok((message.clone(), conversation))
    }

    async fn update_message(&self, message: &Message) -> StoreResult<Message> {
        let mut state = self.state.write().await;
        let stored = state
            .messages
            .get_mut(&message.id)
            .ok_or(RepositoryError::NotFound)?;

        let entry = &mut stored.message;
        entry.content = message.content.clone();
        entry.content_type = message.content_type.clone();
        entry.metadata = message.metadata.clone();
        entry.status = message.status;
        entry.is_edited = message.is_edited;
        entry.edit_count = message.edit_count;
        entry.delivered_at = message.delivered_at;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn delete_message(&self, id: Uuid) -> StoreResult<Conversation> {
        let mut state = self.state.write().await;
        let removed = state.messages.remove(&id).ok_or(RepositoryError::NotFound)?;

        let now = Utc::now();
        for entry in state.messages.values_mut() {
            if entry.message.parent_id == Some(id) {
                entry.message.parent_id = None;
                entry.message.updated_at = now;
            }
        }

        state.refresh_stats(removed.message.conversation_id)
    }

    async fn clear_foreign_parents(&self, conversation_id: Uuid) -> StoreResult<u64> {
        let mut state = self.state.write().await;

        let foreign: Vec<Uuid> = state
            .messages_of(conversation_id)
            .filter(|m| {
                m.message.parent_id.is_some_and(|parent| {
                    state
                        .messages
                        .get(&parent)
                        .is_some_and(|p| p.message.conversation_id != conversation_id)
                })
            })
            .map(|m| m.message.id)
            .collect();

        let now = Utc::now();
        for id in &foreign {
            if let Some(entry) = state.messages.get_mut(id) {
                entry.message.parent_id = None;
                entry.message.updated_at = now;
            }
        }

        Ok(foreign.len() as u64)
    }
}
