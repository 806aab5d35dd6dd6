//! Conversation store and service tests against PostgreSQL

use thicode_conversations::{
    ConversationError, ConversationFilter, ConversationStatus, ConversationStore, Message,
    MessageRole, MessageStatus, NewMessage, DEFAULT_TITLE,
};

use crate::common::TestApp;

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_create_and_find_conversation() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();

    let found = app.store.find_conversation(conv.id).await.unwrap().unwrap();
    assert_eq!(found.title, DEFAULT_TITLE);
    assert_eq!(found.status, ConversationStatus::Active);
    assert_eq!(found.message_count, 0);
    assert!(found.tags.is_empty());

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_insert_message_refreshes_stats() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();

    let hi = app
        .conversations
        .add_message(conv.id, NewMessage::user("Hi"))
        .await
        .unwrap();
    let reply = app
        .conversations
        .add_message(conv.id, NewMessage::assistant("Hello").with_parent(Some(hi.id)))
        .await
        .unwrap();

    let conv = app.conversations.get_conversation(conv.id).await.unwrap();
    assert_eq!(conv.message_count, 2);
    // Postgres stores microseconds
    assert_eq!(
        conv.last_message_at.map(|t| t.timestamp_micros()),
        Some(reply.created_at.timestamp_micros())
    );

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_insert_into_missing_conversation_is_not_found() {
    let app = TestApp::new().await.unwrap();

    let orphan = Message::new(
        uuid::Uuid::new_v4(),
        None,
        MessageRole::User,
        "nobody home".to_string(),
        None,
        None,
    )
    .unwrap();
    let result = app.store.insert_message(&orphan).await;
    assert!(matches!(
        result,
        Err(thicode_common::RepositoryError::NotFound)
    ));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_archive_and_restore_roundtrip() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();

    let archived = app.conversations.archive_conversation(conv.id).await.unwrap();
    assert!(archived.archived_at.is_some());

    let restored = app.conversations.restore_conversation(conv.id).await.unwrap();
    assert_eq!(restored.status, ConversationStatus::Active);
    assert!(restored.archived_at.is_none());

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_archive_with_pending_message_is_conflict() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();
    let pending = Message::new(
        conv.id,
        None,
        MessageRole::User,
        "in flight".to_string(),
        None,
        None,
    )
    .unwrap();
    app.store.insert_message(&pending).await.unwrap();

    let result = app.conversations.archive_conversation(conv.id).await;
    assert!(matches!(result, Err(ConversationError::ConversationConflict(_))));

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_restore_clears_foreign_parents() {
    let app = TestApp::new().await.unwrap();
    let home = app.create_conversation().await.unwrap();
    let other = app.create_conversation().await.unwrap();

    let foreign = app
        .conversations
        .add_message(other.id, NewMessage::user("elsewhere"))
        .await
        .unwrap();
    let mut stray = Message::new(
        home.id,
        Some(foreign.id),
        MessageRole::Assistant,
        "stray".to_string(),
        None,
        None,
    )
    .unwrap();
    stray.status = MessageStatus::Sent;
    app.store.insert_message(&stray).await.unwrap();

    app.conversations.restore_conversation(home.id).await.unwrap();

    let stray = app.store.find_message(stray.id).await.unwrap().unwrap();
    assert!(stray.parent_id.is_none());

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_list_orders_pinned_first_and_searches_messages() {
    let app = TestApp::new().await.unwrap();
    let plain = app.create_conversation().await.unwrap();
    let pinned = app.create_conversation().await.unwrap();
    app.conversations
        .update_metadata(
            pinned.id,
            thicode_conversations::MetadataUpdate {
                is_pinned: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    app.conversations
        .add_message(plain.id, NewMessage::user("tokio select loops"))
        .await
        .unwrap();

    let listed = app
        .conversations
        .list_conversations(&ConversationFilter::for_user(app.user_id))
        .await
        .unwrap();
    assert_eq!(
        listed.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![pinned.id, plain.id]
    );

    let found = app
        .conversations
        .list_conversations(&ConversationFilter {
            search: Some("SELECT LOOP".to_string()),
            ..ConversationFilter::for_user(app.user_id)
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, plain.id);

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_delete_conversation_cascades_messages() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();
    let message = app
        .conversations
        .add_message(conv.id, NewMessage::user("bye"))
        .await
        .unwrap();

    app.conversations.delete_conversation(conv.id).await.unwrap();

    assert!(app.store.find_conversation(conv.id).await.unwrap().is_none());
    assert!(app.store.find_message(message.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_chat_exchange_persists_both_messages() {
    let app = TestApp::new().await.unwrap();

    let exchange = app
        .chat
        .start_conversation(app.user_id, "Explain flexbox")
        .await
        .unwrap();

    assert_eq!(exchange.conversation.title, "Explain flexbox");
    assert_eq!(exchange.conversation.message_count, 2);
    let stored = app
        .messages
        .list_messages(exchange.conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].metadata["model"], "mock-model");
    assert_eq!(app.llm.calls(), 1);

    app.cleanup().await.unwrap();
}
