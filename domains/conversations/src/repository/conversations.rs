//! Conversation repository

use sqlx::PgPool;
use uuid::Uuid;

use super::{ConversationFilter, StoreResult};
use crate::domain::entities::{Conversation, ConversationStatus};

pub(crate) const CONVERSATION_COLUMNS: &str = "id, user_id, title, slug, summary, status, tags, \
     category, is_pinned, message_count, last_message_at, created_at, updated_at, archived_at";

#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find conversation by ID
    pub async fn find(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let query = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
        let conv = sqlx::query_as::<_, Conversation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(conv)
    }

    /// List a user's conversations, pinned first then by latest activity
    pub async fn list(&self, filter: &ConversationFilter) -> StoreResult<Vec<Conversation>> {
        let query = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c \
             WHERE c.user_id = $1 AND c.status = $2 \
               AND ($3::text IS NULL OR c.category = $3) \
               AND ($4::text IS NULL \
                    OR c.title ILIKE '%' || $4 || '%' \
                    OR c.summary ILIKE '%' || $4 || '%' \
                    OR EXISTS (SELECT 1 FROM messages m \
                               WHERE m.conversation_id = c.id \
                                 AND m.content ILIKE '%' || $4 || '%')) \
             ORDER BY c.is_pinned DESC, c.last_message_at DESC NULLS LAST, c.created_at DESC"
        );
        let convs = sqlx::query_as::<_, Conversation>(&query)
            .bind(filter.user_id)
            .bind(filter.status.unwrap_or(ConversationStatus::Active))
            .bind(&filter.category)
            .bind(filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()))
            .fetch_all(&self.pool)
            .await?;

        Ok(convs)
    }

    /// Create a new conversation
    pub async fn create(&self, conv: &Conversation) -> StoreResult<Conversation> {
        let query = format!(
            "INSERT INTO conversations ({CONVERSATION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {CONVERSATION_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Conversation>(&query)
            .bind(conv.id)
            .bind(conv.user_id)
            .bind(&conv.title)
            .bind(&conv.slug)
            .bind(&conv.summary)
            .bind(conv.status)
            .bind(&conv.tags)
            .bind(&conv.category)
            .bind(conv.is_pinned)
            .bind(conv.message_count)
            .bind(conv.last_message_at)
            .bind(conv.created_at)
            .bind(conv.updated_at)
            .bind(conv.archived_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    /// Update the mutable fields; message stats are owned by message writes
    pub async fn update(&self, conv: &Conversation) -> StoreResult<Option<Conversation>> {
        let query = format!(
            "UPDATE conversations SET \
                title = $2, slug = $3, summary = $4, status = $5, tags = $6, \
                category = $7, is_pinned = $8, archived_at = $9, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {CONVERSATION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Conversation>(&query)
            .bind(conv.id)
            .bind(&conv.title)
            .bind(&conv.slug)
            .bind(&conv.summary)
            .bind(conv.status)
            .bind(&conv.tags)
            .bind(&conv.category)
            .bind(conv.is_pinned)
            .bind(conv.archived_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(updated)
    }

    /// Delete a conversation; messages go with it (ON DELETE CASCADE)
    pub async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
