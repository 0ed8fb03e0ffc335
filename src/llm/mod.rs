pub mod providers;
pub mod credentials;
pub mod fence;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use credentials::{AggregateError, Credential, CredentialRotator, CredentialSet, Rotated, CREDENTIAL_ENV_VARS};
pub use fence::{strip_code_fence, FenceError};

/// LLM provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProvider {
    Gemini,
    OpenAI,
    LMStudio,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    /// Overrides the provider's default endpoint
    pub endpoint: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Interchangeable API keys, tried in order
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            endpoint: None,
            model: "gemini-2.0-flash-exp".to_string(),
            max_tokens: 8192,
            temperature: 0.2,
            timeout_seconds: 120,
            api_keys: Vec::new(),
        }
    }
}

/// Errors from a single generative call
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limit or quota exceeded: {0}")]
    Quota(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Empty response from {0:?}")]
    EmptyResponse(LLMProvider),

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification used for log verbosity only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Quota,
    Api,
    EmptyResponse,
    Parse,
    Configuration,
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Http(_) => ErrorKind::Transport,
            LlmError::Quota(_) => ErrorKind::Quota,
            LlmError::Api { .. } => ErrorKind::Api,
            LlmError::EmptyResponse(_) => ErrorKind::EmptyResponse,
            LlmError::Parse(_) => ErrorKind::Parse,
            LlmError::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

impl From<FenceError> for LlmError {
    fn from(err: FenceError) -> Self {
        LlmError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Parse(err.to_string())
    }
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// A text-generation capability. The credential is supplied per call so one
/// provider instance can be driven by a [`CredentialRotator`].
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str, credential: &Credential) -> Result<LLMResponse, LlmError>;
    fn provider_type(&self) -> LLMProvider;
}

/// Create a generative model based on configuration
pub fn create_model(config: &LLMConfig) -> Result<Arc<dyn GenerativeModel>, LlmError> {
    match config.provider {
        LLMProvider::Gemini => Ok(Arc::new(providers::GeminiProvider::new(config.clone())?)),
        LLMProvider::OpenAI | LLMProvider::LMStudio => {
            Ok(Arc::new(providers::ChatCompletionsProvider::new(config.clone())?))
        }
    }
}
