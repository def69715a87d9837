//! Chat Client
//!
//! HTTP client for an OpenAI-compatible chat-completions endpoint, behind a
//! trait seam so the tool loop is testable with a scripted backend. Retry
//! with exponential backoff lives here as a policy applied around the call,
//! not at call sites.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;

/// One chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Errors from the chat endpoint.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM timeout after {0}s")]
    Timeout(u64),

    #[error("LLM rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM response parsing error: {0}")]
    Parse(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::Api(_))
    }
}

/// The seam the orchestrator drives. Production uses `HttpChatBackend`;
/// tests use a scripted implementation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Exponential backoff policy for transient LLM failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_secs(config.retry_base_delay_secs),
            max_delay: Duration::from_secs(config.retry_max_delay_secs),
        }
    }
}

/// Call the backend with retry on transient errors: up to
/// `policy.attempts` tries, delay doubling from `base_delay` and capped at
/// `max_delay`.
pub async fn chat_with_retry(
    backend: &dyn ChatBackend,
    messages: &[ChatMessage],
    policy: &RetryPolicy,
) -> Result<String, LlmError> {
    let mut delay = policy.base_delay;
    let mut last_error = None;

    for attempt in 1..=policy.attempts {
        match backend.chat(messages).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts = policy.attempts,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "LLM call failed, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
                last_error = Some(e);
            },
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| LlmError::Api("retry budget exhausted".to_string())))
}

// ============================================================================
// HTTP backend
// ============================================================================

pub struct HttpChatBackend {
    http_client: Client,
    api_base: String,
    model: String,
    username: String,
    password: String,
    temperature: f64,
    timeout: Duration,
}

impl HttpChatBackend {
    pub fn from_config(config: &LlmConfig) -> Result<Self, anyhow::Error> {
        let (username, password) = config
            .credential
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("LLM credential must be username:password"))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build LLM HTTP client: {}", e))?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            username: username.to_string(),
            password: password.to_string(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: Some(self.temperature),
        };

        let url = format!("{}/chat/completions", self.api_base);
        tracing::debug!(url = %url, model = %self.model, "calling LLM API");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout.as_secs())
                } else {
                    LlmError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Api(format!("API error {}: {}", status, error_text)));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::Parse("empty response from LLM".to_string()))
    }
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
