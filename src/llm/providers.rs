use super::{Credential, GenerativeModel, LLMConfig, LLMProvider, LLMResponse, LlmError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const LMSTUDIO_ENDPOINT: &str = "http://localhost:1234/v1/chat/completions";

/// Body fragments that indicate a quota or rate limit rather than a hard failure
const QUOTA_MARKERS: [&str; 5] = ["rate limit", "quota", "limit exceeded", "too many requests", "resource_exhausted"];

/// Map a non-success HTTP response to an error
fn classify_failure(status: StatusCode, body: String) -> LlmError {
    let lowered = body.to_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS || QUOTA_MARKERS.iter().any(|m| lowered.contains(m)) {
        LlmError::Quota(format!("{}: {}", status, truncate(&body, 200)))
    } else {
        LlmError::Api {
            status: status.as_u16(),
            body: truncate(&body, 500),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn build_client(timeout_seconds: u64) -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()?)
}

/// Gemini provider implementation
pub struct GeminiProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "totalTokenCount")]
    total_token_count: u32,
}

impl GeminiProvider {
    pub fn new(config: LLMConfig) -> Result<Self, LlmError> {
        let client = build_client(config.timeout_seconds)?;
        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        let base = self.config.endpoint.as_deref().unwrap_or(GEMINI_BASE_URL);
        format!("{}/{}:generateContent", base.trim_end_matches('/'), self.config.model)
    }
}

#[async_trait]
impl GenerativeModel for GeminiProvider {
    async fn generate(&self, prompt: &str, credential: &Credential) -> Result<LLMResponse, LlmError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt.to_string() }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        };

        debug!("Sending request to Gemini model {}", self.config.model);

        // Key goes in a header so it never shows up in reqwest error URLs
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", credential.expose())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, text));
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let content = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse(LLMProvider::Gemini))?;

        let tokens_used = gemini_response.usage_metadata.map(|u| u.total_token_count);

        Ok(LLMResponse { content, tokens_used })
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::Gemini
    }
}

/// OpenAI-compatible chat completions (OpenAI, LM Studio)
pub struct ChatCompletionsProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

impl ChatCompletionsProvider {
    pub fn new(config: LLMConfig) -> Result<Self, LlmError> {
        if config.provider == LLMProvider::Gemini {
            return Err(LlmError::Configuration(
                "chat completions provider cannot serve Gemini".to_string(),
            ));
        }
        let client = build_client(config.timeout_seconds)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> &str {
        match (&self.config.endpoint, self.config.provider) {
            (Some(endpoint), _) => endpoint,
            (None, LLMProvider::LMStudio) => LMSTUDIO_ENDPOINT,
            (None, _) => OPENAI_ENDPOINT,
        }
    }
}

#[async_trait]
impl GenerativeModel for ChatCompletionsProvider {
    async fn generate(&self, prompt: &str, credential: &Credential) -> Result<LLMResponse, LlmError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!("Sending request to {:?} at {}", self.config.provider, self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(credential.expose())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, text));
        }

        let chat_response: ChatResponse = response.json().await?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse(self.config.provider))?;

        let tokens_used = chat_response.usage.map(|u| u.total_tokens);

        Ok(LLMResponse { content, tokens_used })
    }

    fn provider_type(&self) -> LLMProvider {
        self.config.provider
    }
}
