//! Chat exchanges: store the user's message, ask the model, store the reply

use std::sync::Arc;

use serde::Serialize;
use thicode_cache::CircuitBreaker;
use thicode_common::RetryPolicy;
use thicode_llm::{CompletionRequest, CompletionResponse, LlmError, LlmMessage, LlmService};
use uuid::Uuid;

use super::{ConversationService, MessageService, NewConversation, NewMessage};
use crate::domain::entities::{Conversation, Message, MessageRole, MessageStatus, DEFAULT_TITLE};
use crate::domain::errors::{ConversationError, Result};

pub const SYSTEM_PROMPT: &str =
    "You are ThiCodeAI, a web development assistant. Respond clearly and helpfully.";

/// Most recent messages sent to the model as context
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// One completed user/assistant round trip
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub conversation: Conversation,
    pub user_message: Message,
    pub assistant_message: Message,
}

#[derive(Clone)]
pub struct ChatService {
    conversations: ConversationService,
    messages: MessageService,
    llm: Arc<dyn LlmService>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        conversations: ConversationService,
        messages: MessageService,
        llm: Arc<dyn LlmService>,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            conversations,
            messages,
            llm,
            breaker,
            retry,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Create a conversation and run its first exchange
    pub async fn start_conversation(&self, user_id: Uuid, content: impl Into<String>) -> Result<Exchange> {
        let conversation = self
            .conversations
            .create_conversation(NewConversation::for_user(user_id))
            .await?;
        self.send_message(conversation.id, content).await
    }

    /// Store a user message, generate the assistant's reply and store it.
    ///
    /// When the model cannot answer, the user message is marked as failed and
    /// a system note records the error so the conversation can continue.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        content: impl Into<String>,
    ) -> Result<Exchange> {
        let parent_id = self
            .messages
            .latest_message(conversation_id, None)
            .await?
            .map(|m| m.id);

        let user_message = self
            .conversations
            .add_message(conversation_id, NewMessage::user(content).with_parent(parent_id))
            .await?;

        let outcome = async {
            let request = self.build_request(conversation_id).await?;
            let response = self.complete(request).await?;

            let metadata = serde_json::json!({
                "model": response.model,
                "input_tokens": response.input_tokens,
                "output_tokens": response.output_tokens,
            });
            self.conversations
                .add_message(
                    conversation_id,
                    NewMessage::assistant(response.content)
                        .with_parent(Some(user_message.id))
                        .with_metadata(metadata),
                )
                .await
        }
        .await;

        let assistant_message = match outcome {
            Ok(message) => message,
            Err(e) => {
                self.record_failure(conversation_id, user_message.id, &e).await;
                return Err(e);
            }
        };

        let user_message = self.messages.mark_delivered(user_message.id).await?;

        tracing::info!(
            conversation_id = %conversation_id,
            user_message_id = %user_message.id,
            assistant_message_id = %assistant_message.id,
            "Exchange completed"
        );

        let mut conversation = self.conversations.get_conversation(conversation_id).await?;
        if conversation.title == DEFAULT_TITLE {
            match self.conversations.update_title(conversation_id, None).await {
                Ok(titled) => conversation = titled,
                Err(e) => {
                    tracing::warn!(conversation_id = %conversation_id, error = %e, "Failed to generate title")
                }
            }
        }

        Ok(Exchange {
            conversation,
            user_message,
            assistant_message,
        })
    }

    /// Conversation history as model input, oldest first
    async fn build_request(&self, conversation_id: Uuid) -> Result<CompletionRequest> {
        let history = self.messages.list_messages(conversation_id).await?;

        let mut messages: Vec<LlmMessage> = history
            .into_iter()
            .filter(|m| m.status != MessageStatus::Error)
            .filter_map(|m| match m.role {
                MessageRole::User => Some(LlmMessage::user(m.content)),
                MessageRole::Assistant => Some(LlmMessage::assistant(m.content)),
                MessageRole::System => None,
            })
            .collect();
        if messages.len() > self.history_limit {
            messages.drain(..messages.len() - self.history_limit);
        }

        Ok(CompletionRequest {
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            messages,
            ..CompletionRequest::default()
        })
    }

    /// Call the model through the circuit breaker, retrying transient failures
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.retry
            .run("ai_completion", || {
                let request = request.clone();
                async move {
                    self.breaker
                        .call(|| async move {
                            let response = self.llm.complete(request).await?;
                            if response.content.trim().is_empty() {
                                return Err(LlmError::Response("empty completion".to_string()));
                            }
                            Ok(response)
                        })
                        .await
                        .map_err(ConversationError::from)
                }
            })
            .await
    }

    async fn record_failure(&self, conversation_id: Uuid, user_message_id: Uuid, error: &ConversationError) {
        tracing::warn!(
            conversation_id = %conversation_id,
            message_id = %user_message_id,
            error = %error,
            "Failed to generate response"
        );

        if let Err(e) = self.messages.mark_failed(user_message_id).await {
            tracing::warn!(message_id = %user_message_id, error = %e, "Failed to mark message as failed");
        }

        let note = NewMessage::new(
            MessageRole::System,
            format!("Error generating response: {}", error),
        )
        .with_parent(Some(user_message_id));
        if let Err(e) = self.conversations.add_message(conversation_id, note).await {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "Failed to record error note");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_log::test;
    use thicode_cache::breaker::DEFAULT_BREAKER_KEY;
    use thicode_cache::{CacheStore, CircuitState};
    use thicode_common::RetryPolicy;

    use super::*;
    use crate::service::test_support::{harness, harness_with_retry};

    #[test(tokio::test)]
    async fn test_start_conversation_runs_exchange() {
        let h = harness();

        let exchange = h
            .chat
            .start_conversation(Uuid::new_v4(), "How do I center a div?")
            .await
            .unwrap();

        assert_eq!(exchange.user_message.status, MessageStatus::Delivered);
        assert!(exchange.user_message.delivered_at.is_some());
        assert_eq!(exchange.assistant_message.role, MessageRole::Assistant);
        assert_eq!(
            exchange.assistant_message.parent_id,
            Some(exchange.user_message.id)
        );
        assert_eq!(
            exchange.assistant_message.content,
            "Mock response to: How do I center a div?"
        );
        assert_eq!(exchange.assistant_message.metadata["model"], "mock-model");

        assert_eq!(exchange.conversation.title, "How do I center a div?");
        assert_eq!(exchange.conversation.message_count, 2);
        assert_eq!(
            exchange.conversation.last_message_at,
            Some(exchange.assistant_message.created_at)
        );
        assert_eq!(h.llm.calls(), 1);
    }

    #[test(tokio::test)]
    async fn test_follow_up_is_parented_to_previous_reply() {
        let h = harness();
        let first = h
            .chat
            .start_conversation(Uuid::new_v4(), "First question")
            .await
            .unwrap();

        let second = h
            .chat
            .send_message(first.conversation.id, "Second question")
            .await
            .unwrap();

        assert_eq!(
            second.user_message.parent_id,
            Some(first.assistant_message.id)
        );
        assert_eq!(second.conversation.message_count, 4);
        // Title stays from the first exchange
        assert_eq!(second.conversation.title, "First question");
    }

    #[test(tokio::test)]
    async fn test_ai_failure_marks_message_and_records_note() {
        let h = harness_with_retry(RetryPolicy::none());
        let conv = h
            .conversations
            .create_conversation(NewConversation::for_user(Uuid::new_v4()))
            .await
            .unwrap();
        h.llm.fail_next(1);

        let result = h.chat.send_message(conv.id, "Hello?").await;
        assert!(matches!(result, Err(ConversationError::AiService(_))));

        let messages = h.messages.list_messages(conv.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].status, MessageStatus::Error);
        assert_eq!(messages[1].role, MessageRole::System);
        assert_eq!(messages[1].parent_id, Some(messages[0].id));
        assert!(messages[1].content.starts_with("Error generating response:"));

        assert_eq!(h.breaker.failure_count().await.unwrap(), 1);
    }

    #[test(tokio::test)]
    async fn test_rejected_request_is_not_retried() {
        let h = harness();
        let conv = h
            .conversations
            .create_conversation(NewConversation::for_user(Uuid::new_v4()))
            .await
            .unwrap();
        h.llm.reject_next(1);

        let result = h.chat.send_message(conv.id, "Hello?").await;
        assert!(matches!(result, Err(ConversationError::Internal(_))));
        assert_eq!(h.llm.calls(), 1);
        assert_eq!(h.breaker.failure_count().await.unwrap(), 1);

        let user_message = h
            .messages
            .latest_message(conv.id, Some(MessageRole::User))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user_message.status, MessageStatus::Error);
    }

    #[test(tokio::test)]
    async fn test_send_after_failure_succeeds() {
        let h = harness_with_retry(RetryPolicy::none());
        let conv = h
            .conversations
            .create_conversation(NewConversation::for_user(Uuid::new_v4()))
            .await
            .unwrap();
        h.llm.fail_next(1);
        h.chat.send_message(conv.id, "Hello?").await.unwrap_err();

        let exchange = h.chat.send_message(conv.id, "Hello again").await.unwrap();
        assert_eq!(exchange.assistant_message.content, "Mock response to: Hello again");
        assert_eq!(exchange.conversation.message_count, 4);
        // Failed message still seeds the title
        assert_eq!(exchange.conversation.title, "Hello?");
        assert_eq!(h.breaker.failure_count().await.unwrap(), 0);
    }

    #[test(tokio::test)]
    async fn test_transient_failures_are_retried() {
        let h = harness();
        let conv = h
            .conversations
            .create_conversation(NewConversation::for_user(Uuid::new_v4()))
            .await
            .unwrap();
        h.llm.fail_next(2);

        let exchange = h.chat.send_message(conv.id, "Flaky upstream").await.unwrap();

        assert_eq!(h.llm.calls(), 3);
        assert_eq!(exchange.user_message.status, MessageStatus::Delivered);
        assert_eq!(h.breaker.state().await.unwrap(), CircuitState::Closed);
        assert_eq!(h.breaker.failure_count().await.unwrap(), 0);
    }

    #[test(tokio::test)]
    async fn test_open_circuit_skips_model() {
        let h = harness();
        let conv = h
            .conversations
            .create_conversation(NewConversation::for_user(Uuid::new_v4()))
            .await
            .unwrap();
        h.cache
            .set(DEFAULT_BREAKER_KEY, "5", Duration::from_secs(300))
            .await
            .unwrap();

        let result = h.chat.send_message(conv.id, "Anyone there?").await;

        assert!(matches!(result, Err(ConversationError::AiUnavailable(_))));
        assert_eq!(h.llm.calls(), 0);

        let user_message = h
            .messages
            .latest_message(conv.id, Some(MessageRole::User))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user_message.status, MessageStatus::Error);
    }

    #[test(tokio::test)]
    async fn test_repeated_failures_open_circuit() {
        let h = harness_with_retry(RetryPolicy::none());
        let conv = h
            .conversations
            .create_conversation(NewConversation::for_user(Uuid::new_v4()))
            .await
            .unwrap();
        h.llm.fail_next(10);

        for _ in 0..5 {
            let result = h.chat.send_message(conv.id, "ping").await;
            assert!(matches!(result, Err(ConversationError::AiService(_))));
        }
        let result = h.chat.send_message(conv.id, "ping").await;
        assert!(matches!(result, Err(ConversationError::AiUnavailable(_))));
        assert_eq!(h.llm.calls(), 5);
    }

    #[test(tokio::test)]
    async fn test_history_excludes_failed_and_system_messages() {
        let h = harness_with_retry(RetryPolicy::none());
        let conv = h
            .conversations
            .create_conversation(NewConversation::for_user(Uuid::new_v4()))
            .await
            .unwrap();
        h.llm.fail_next(1);
        h.chat.send_message(conv.id, "lost").await.unwrap_err();
        h.chat.send_message(conv.id, "kept").await.unwrap();

        let request = h.chat.build_request(conv.id).await.unwrap();
        let contents: Vec<_> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["kept", "Mock response to: kept"]);
        assert_eq!(request.system_prompt.as_deref(), Some(SYSTEM_PROMPT));
    }

    #[test(tokio::test)]
    async fn test_history_limit_keeps_most_recent() {
        let h = harness();
        let chat = h.chat.clone().with_history_limit(2);
        let exchange = chat.start_conversation(Uuid::new_v4(), "one").await.unwrap();
        chat.send_message(exchange.conversation.id, "two").await.unwrap();

        let request = chat.build_request(exchange.conversation.id).await.unwrap();
        let contents: Vec<_> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "Mock response to: two"]);
    }

    #[test(tokio::test)]
    async fn test_archived_conversation_rejects_send() {
        let h = harness();
        let conv = h
            .conversations
            .create_conversation(NewConversation::for_user(Uuid::new_v4()))
            .await
            .unwrap();
        h.conversations.archive_conversation(conv.id).await.unwrap();

        let result = h.chat.send_message(conv.id, "Hello").await;
        assert!(matches!(result, Err(ConversationError::InvalidState(_))));
        assert_eq!(h.llm.calls(), 0);
    }
}
