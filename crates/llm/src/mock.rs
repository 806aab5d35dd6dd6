//! Mock LLM Service Implementation
//!
//! Used by `LlmServiceFactory` when provider is `"mock"` and by service tests.
//! Returns deterministic responses and can be told to fail the next N calls.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::{CompletionRequest, CompletionResponse, LlmError, LlmService};

/// Mock LLM service for testing. Clones share call counters.
#[derive(Debug, Clone, Default)]
pub struct MockLlmService {
    calls: Arc<AtomicU32>,
    failures_remaining: Arc<AtomicU32>,
    rejections_remaining: Arc<AtomicU32>,
}

impl MockLlmService {
    /// Create a new mock LLM service
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with a transient request error
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` calls fail as rejected requests
    pub fn reject_next(&self, count: u32) {
        self.rejections_remaining.store(count, Ordering::SeqCst);
    }

    /// Total `complete` invocations, failed ones included
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait::async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if take_one(&self.rejections_remaining) {
            tracing::debug!("Mock LLM service returning scripted rejection");
            return Err(LlmError::Rejected("mock invalid request".to_string()));
        }
        if take_one(&self.failures_remaining) {
            tracing::debug!("Mock LLM service returning scripted failure");
            return Err(LlmError::Request("mock upstream failure".to_string()));
        }

        tracing::info!("Mock LLM service processing completion request");

        let model = if request.model.is_empty() {
            "mock-model".to_string()
        } else {
            request.model
        };

        let last_message = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or("empty");

        let content = format!("Mock response to: {}", last_message);
        let input_tokens = request
            .messages
            .iter()
            .map(|m| m.content.len() as i32 / 4)
            .sum::<i32>();
        let output_tokens = content.len() as i32 / 4;

        Ok(CompletionResponse {
            content,
            model,
            input_tokens,
            output_tokens,
            stop_reason: "stop".to_string(),
        })
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }
}
