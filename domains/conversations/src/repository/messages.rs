//! Message repository

use sqlx::PgPool;
use uuid::Uuid;

use super::StoreResult;
use crate::domain::entities::{Message, MessageRole, MessageStatus};

pub(crate) const MESSAGE_COLUMNS: &str = "id, conversation_id, parent_id, role, content, \
     content_type, metadata, status, is_edited, edit_count, created_at, updated_at, delivered_at";

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, id: Uuid) -> StoreResult<Option<Message>> {
        let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let message = sqlx::query_as::<_, Message>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(message)
    }

    /// List messages for a conversation, oldest first
    pub async fn list_by_conversation(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 \
             ORDER BY created_at ASC"
        );
        let messages = sqlx::query_as::<_, Message>(&query)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(messages)
    }

    pub async fn list_replies(&self, parent_id: Uuid) -> StoreResult<Vec<Message>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE parent_id = $1 \
             ORDER BY created_at ASC"
        );
        let replies = sqlx::query_as::<_, Message>(&query)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(replies)
    }

    pub async fn latest_reply(&self, parent_id: Uuid) -> StoreResult<Option<Message>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE parent_id = $1 \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        let reply = sqlx::query_as::<_, Message>(&query)
            .bind(parent_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(reply)
    }

    pub async fn latest(
        &self,
        conversation_id: Uuid,
        role: Option<MessageRole>,
    ) -> StoreResult<Option<Message>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND ($2::message_role IS NULL OR role = $2) \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        let message = sqlx::query_as::<_, Message>(&query)
            .bind(conversation_id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?;

        Ok(message)
    }

    pub async fn first_by_role(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
    ) -> StoreResult<Option<Message>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND role = $2 \
             ORDER BY created_at ASC \
             LIMIT 1"
        );
        let message = sqlx::query_as::<_, Message>(&query)
            .bind(conversation_id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?;

        Ok(message)
    }

    pub async fn count_with_status(
        &self,
        conversation_id: Uuid,
        status: MessageStatus,
    ) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND status = $2",
        )
        .bind(conversation_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Persist content, status and edit tracking
    pub async fn update(&self, message: &Message) -> StoreResult<Option<Message>> {
        let query = format!(
            "UPDATE messages SET \
                content = $2, content_type = $3, metadata = $4, status = $5, \
                is_edited = $6, edit_count = $7, delivered_at = $8, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Message>(&query)
            .bind(message.id)
            .bind(&message.content)
            .bind(&message.content_type)
            .bind(&message.metadata)
            .bind(message.status)
            .bind(message.is_edited)
            .bind(message.edit_count)
            .bind(message.delivered_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(updated)
    }

    /// Orphan recovery: null out parents that live in another conversation
    pub async fn clear_foreign_parents(&self, conversation_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages m SET parent_id = NULL, updated_at = NOW()
            FROM messages p
            WHERE m.parent_id = p.id
              AND m.conversation_id = $1
              AND p.conversation_id <> $1
            "#,
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
