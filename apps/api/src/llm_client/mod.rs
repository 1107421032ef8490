//! LLM Gateway — the single point of entry for all OpenAI API calls.
//!
//! ARCHITECTURAL RULE: no other module may call the provider directly.
//! The gateway is a narrow trait so the proposal service can be tested
//! against a deterministic fake; retry policy lives in the service, not
//! in the transport.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Pass-through tuning configuration for the provider call.
/// All numeric fields are range-checked once at startup (see `config`).
#[derive(Debug, Clone)]
pub struct OpenAiModelConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

/// A successful completion from the provider.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u32,
    pub model: String,
}

/// Gateway failure, classified for the service retry policy:
/// `Transient` is retryable, `Invalid` and `Auth` never are, and
/// `Unknown` is retried at most once.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("provider rejected the request: {0}")]
    Invalid(String),

    #[error("provider authentication failed: {0}")]
    Auth(String),

    #[error("unexpected provider error: {0}")]
    Unknown(String),
}

/// The external language-model collaborator, behind a trait so tests can
/// substitute a deterministic fake.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        config: &OpenAiModelConfig,
    ) -> Result<Completion, GatewayError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAI client
// ────────────────────────────────────────────────────────────────────────────

/// Production `LlmGateway` backed by the OpenAI chat-completions API.
/// Single-shot per call — the proposal service owns retries and backoff.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl LlmGateway for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        config: &OpenAiModelConfig,
    ) -> Result<Completion, GatewayError> {
        let request_body = ChatRequest {
            model: &config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GatewayError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(classify_status(status, message));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unknown(format!("malformed provider response: {e}")))?;

        let text = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GatewayError::Unknown("provider returned empty content".to_string()))?;

        debug!(
            "LLM call succeeded: model={}, total_tokens={}",
            chat.model, chat.usage.total_tokens
        );

        Ok(Completion {
            text,
            tokens_used: chat.usage.total_tokens,
            model: chat.model,
        })
    }
}

/// Maps an HTTP status to the gateway error taxonomy.
/// 429 and 5xx are provider hiccups worth retrying; 401/403 are credential
/// failures; other 4xx mean the request itself was rejected.
fn classify_status(status: StatusCode, message: String) -> GatewayError {
    match status.as_u16() {
        401 | 403 => GatewayError::Auth(message),
        429 => GatewayError::Transient(format!("rate limited by provider: {message}")),
        s if s >= 500 => GatewayError::Transient(format!("provider error {s}: {message}")),
        s if (400..500).contains(&s) => GatewayError::Invalid(message),
        s => GatewayError::Unknown(format!("unexpected status {s}: {message}")),
    }
}
