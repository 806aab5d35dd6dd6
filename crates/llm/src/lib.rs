//! ThiCode LLM Service
//!
//! Chat-completion boundary used by the conversation services:
//! - `LlmService` trait with `complete` and the single-prompt `generate_response`
//! - `MistralService` calling the Mistral chat completions API
//! - `MockLlmService` for local runs and tests

pub mod mistral;
pub mod mock;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use thicode_common::config::env_parse;

pub use mistral::MistralService;
pub use mock::MockLlmService;

pub const DEFAULT_MODEL: &str = "mistral-large-latest";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM configuration error: {0}")]
    Configuration(String),

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM response error: {0}")]
    Response(String),

    #[error("LLM rate limit exceeded")]
    RateLimit,

    /// Upstream refused the request itself (bad key, malformed body)
    #[error("LLM request rejected: {0}")]
    Rejected(String),
}

impl LlmError {
    /// Whether the same request could succeed later. Configuration errors
    /// and rejected requests never do.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LlmError::Configuration(_) | LlmError::Rejected(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
    Assistant,
}

impl LlmRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmRole::System => "system",
            LlmRole::User => "user",
            LlmRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: content.into(),
        }
    }
}

/// Provider-agnostic completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Model name; empty selects the service default
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub stop_reason: String,
}

/// Chat completion provider
#[async_trait::async_trait]
pub trait LlmService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    fn default_model(&self) -> &str;

    /// Send a single user prompt and return the reply text
    async fn generate_response(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self
            .complete(CompletionRequest {
                messages: vec![LlmMessage::user(prompt)],
                ..CompletionRequest::default()
            })
            .await?;
        Ok(response.content)
    }
}

/// LLM service configuration
#[derive(Clone)]
pub struct LlmConfig {
    /// Provider (mistral, mock)
    pub provider: String,
    pub api_key: String,
    pub default_model: String,
    pub max_tokens: u32,
    /// Override for the provider base URL
    pub base_url: Option<String>,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("default_model", &self.default_model)
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            api_key: String::new(),
            default_model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LlmConfig {
    /// Create LLM config from environment variables
    pub fn from_env() -> Result<Self, LlmError> {
        dotenvy::dotenv().ok();

        let provider = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "mistral".to_string());
        let api_key = std::env::var("MISTRAL_API_KEY").unwrap_or_default();

        if provider == "mistral" && api_key.is_empty() {
            return Err(LlmError::Configuration(
                "MISTRAL_API_KEY is required for the mistral provider".to_string(),
            ));
        }

        Ok(Self {
            provider,
            api_key,
            default_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_tokens: env_parse("LLM_MAX_TOKENS", DEFAULT_MAX_TOKENS),
            base_url: std::env::var("LLM_BASE_URL").ok().filter(|u| !u.is_empty()),
            timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs())),
        })
    }
}

/// Factory for creating LlmService implementations
pub struct LlmServiceFactory;

impl LlmServiceFactory {
    pub fn create(config: LlmConfig) -> Result<Box<dyn LlmService>, LlmError> {
        match config.provider.as_str() {
            "mistral" => {
                tracing::info!(model = %config.default_model, "Creating Mistral LLM service");
                Ok(Box::new(MistralService::new(config)?))
            }
            "mock" => {
                tracing::info!("Creating mock LLM service");
                Ok(Box::new(MockLlmService::new()))
            }
            provider => Err(LlmError::Configuration(format!(
                "Unknown LLM provider: {}. Supported providers: mistral, mock",
                provider
            ))),
        }
    }
}
