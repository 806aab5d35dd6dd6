//! Message store tests against PostgreSQL

use thicode_common::RepositoryError;
use thicode_conversations::{
    ConversationError, ConversationStore, Message, MessageRole, MessageStatus, NewMessage,
};

use crate::common::TestApp;

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_status_transitions_persist() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();
    let message = app
        .conversations
        .add_message(conv.id, NewMessage::user("Hi"))
        .await
        .unwrap();
    assert_eq!(message.status, MessageStatus::Sent);

    let delivered = app.messages.mark_delivered(message.id).await.unwrap();
    assert_eq!(delivered.status, MessageStatus::Delivered);
    assert!(delivered.delivered_at.is_some());

    let stored = app.store.find_message(message.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Delivered);

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_edit_message_persists_edit_tracking() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();
    let message = app
        .conversations
        .add_message(conv.id, NewMessage::user("typo"))
        .await
        .unwrap();

    app.messages
        .edit_message(message.id, "fixed".to_string())
        .await
        .unwrap();

    let stored = app.store.find_message(message.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "fixed");
    assert!(stored.is_edited);
    assert_eq!(stored.edit_count, 1);

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_same_role_reply_is_rejected() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();
    let question = app
        .conversations
        .add_message(conv.id, NewMessage::user("Q"))
        .await
        .unwrap();
    app.conversations
        .add_message(conv.id, NewMessage::assistant("A").with_parent(Some(question.id)))
        .await
        .unwrap();

    let result = app
        .conversations
        .add_message(conv.id, NewMessage::assistant("A2").with_parent(Some(question.id)))
        .await;
    assert!(matches!(result, Err(ConversationError::OrderingViolation(_))));

    let conv = app.conversations.get_conversation(conv.id).await.unwrap();
    assert_eq!(conv.message_count, 2);

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_delete_message_detaches_replies() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();
    let question = app
        .conversations
        .add_message(conv.id, NewMessage::user("Q"))
        .await
        .unwrap();
    let answer = app
        .conversations
        .add_message(conv.id, NewMessage::assistant("A").with_parent(Some(question.id)))
        .await
        .unwrap();

    let conv = app.messages.delete_message(question.id).await.unwrap();
    assert_eq!(conv.message_count, 1);

    let answer = app.store.find_message(answer.id).await.unwrap().unwrap();
    assert!(answer.parent_id.is_none());

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_thread_walks_ancestors() {
    let app = TestApp::new().await.unwrap();
    let exchange = app
        .chat
        .start_conversation(app.user_id, "first")
        .await
        .unwrap();

    let thread = app
        .messages
        .get_thread(exchange.assistant_message.id)
        .await
        .unwrap();
    assert_eq!(thread.ancestors.len(), 1);
    assert_eq!(thread.ancestors[0].id, exchange.user_message.id);
    assert!(thread.replies.is_empty());

    app.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_insert_into_archived_conversation_is_refused() {
    let app = TestApp::new().await.unwrap();
    let conv = app.create_conversation().await.unwrap();
    app.conversations.archive_conversation(conv.id).await.unwrap();

    // Straight to the store, as if the archive landed after the service check
    let late = Message::new(conv.id, None, MessageRole::User, "late".into(), None, None).unwrap();
    let result = app.store.insert_message(&late).await;
    assert!(matches!(result, Err(RepositoryError::InvalidState(_))));
    assert!(app.store.find_message(late.id).await.unwrap().is_none());

    app.cleanup().await.unwrap();
}
