//! Mistral Chat Completions Implementation
//!
//! Calls the Mistral chat completions API
//! (https://api.mistral.ai/v1/chat/completions) using reqwest HTTP client.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{CompletionRequest, CompletionResponse, LlmConfig, LlmError, LlmRole, LlmService};

const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// Chat completions request body
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<MessageBody>,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    role: &'static str,
    content: String,
}

/// Chat completions response body
#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: i32,
    completion_tokens: i32,
}

/// Mistral API error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// Classify a non-2xx response. Client errors other than timeouts and rate
/// limits are the request's own fault and are not worth repeating.
fn error_from_status(status: StatusCode, body: &str) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimit;
    }

    let detail = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => format!(
            "Mistral API error ({}): {}",
            error.error_type.as_deref().unwrap_or("unknown"),
            error.message
        ),
        Err(_) => format!("Mistral API returned {}: {}", status, body),
    };

    if status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT {
        LlmError::Rejected(detail)
    } else {
        LlmError::Response(detail)
    }
}

/// Mistral LLM service implementation
pub struct MistralService {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

impl MistralService {
    /// Create a new Mistral service
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn build_body(&self, request: CompletionRequest) -> ChatRequest {
        let model = if request.model.is_empty() {
            self.config.default_model.clone()
        } else {
            request.model
        };

        let messages = request
            .system_prompt
            .map(|prompt| MessageBody {
                role: LlmRole::System.as_str(),
                content: prompt,
            })
            .into_iter()
            .chain(request.messages.into_iter().map(|m| MessageBody {
                role: m.role.as_str(),
                content: m.content,
            }))
            .collect();

        ChatRequest {
            model,
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            messages,
        }
    }
}

#[async_trait::async_trait]
impl LlmService for MistralService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(request);
        let url = format!("{}/v1/chat/completions", self.base_url);

        tracing::debug!(
            model = %body.model,
            max_tokens = body.max_tokens,
            messages = body.messages.len(),
            "Sending Mistral API request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(error_from_status(status, &error_body));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Response(format!("Failed to parse response: {}", e)))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Response("Response contained no choices".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: api_response.model,
            input_tokens: api_response.usage.prompt_tokens,
            output_tokens: api_response.usage.completion_tokens,
            stop_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }
}
