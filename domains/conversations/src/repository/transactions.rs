//! Transaction helpers for Conversations domain

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::conversations::CONVERSATION_COLUMNS;
use super::messages::MESSAGE_COLUMNS;
use crate::domain::entities::{Conversation, ConversationStatus, Message};

/// Lock the conversation row for the rest of the transaction.
/// Returns its status, or `None` when it does not exist.
pub async fn lock_conversation_tx(
    tx: &mut Transaction<'_, Postgres>,
    conversation_id: Uuid,
) -> Result<Option<ConversationStatus>, sqlx::Error> {
    sqlx::query_scalar::<_, ConversationStatus>(
        "SELECT status FROM conversations WHERE id = $1 FOR UPDATE",
    )
    .bind(conversation_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Create a message within a transaction
pub async fn create_message_tx(
    tx: &mut Transaction<'_, Postgres>,
    message: &Message,
) -> Result<Message, sqlx::Error> {
    let query = format!(
        "INSERT INTO messages ({MESSAGE_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING {MESSAGE_COLUMNS}"
    );
    sqlx::query_as::<_, Message>(&query)
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.parent_id)
        .bind(message.role)
        .bind(&message.content)
        .bind(&message.content_type)
        .bind(&message.metadata)
        .bind(message.status)
        .bind(message.is_edited)
        .bind(message.edit_count)
        .bind(message.created_at)
        .bind(message.updated_at)
        .bind(message.delivered_at)
        .fetch_one(&mut **tx)
        .await
}

/// Recompute `message_count` and `last_message_at` from the messages table
pub async fn refresh_message_stats_tx(
    tx: &mut Transaction<'_, Postgres>,
    conversation_id: Uuid,
) -> Result<Conversation, sqlx::Error> {
    let query = format!(
        "UPDATE conversations SET \
            message_count = (SELECT COUNT(*) FROM messages WHERE conversation_id = $1), \
            last_message_at = (SELECT MAX(created_at) FROM messages WHERE conversation_id = $1), \
            updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {CONVERSATION_COLUMNS}"
    );
    sqlx::query_as::<_, Conversation>(&query)
        .bind(conversation_id)
        .fetch_one(&mut **tx)
        .await
}

/// Conversation owning a message
pub async fn message_conversation_tx(
    tx: &mut Transaction<'_, Postgres>,
    message_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>("SELECT conversation_id FROM messages WHERE id = $1")
        .bind(message_id)
        .fetch_optional(&mut **tx)
        .await
}

/// Clear the parent reference of every direct reply to `message_id`
pub async fn detach_replies_tx(
    tx: &mut Transaction<'_, Postgres>,
    message_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE messages SET parent_id = NULL, updated_at = NOW() WHERE parent_id = $1")
            .bind(message_id)
            .execute(&mut **tx)
            .await?;
    Ok(result.rows_affected())
}

pub async fn delete_message_tx(
    tx: &mut Transaction<'_, Postgres>,
    message_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM messages WHERE id = $1")
        .bind(message_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}
