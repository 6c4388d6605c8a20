//! LLM Client - HTTP client for OpenAI-compatible APIs
//!
//! Uses reqwest to call LLM APIs. Compatible with:
//! - OpenAI
//! - Azure OpenAI
//! - DeepSeek
//! - Other OpenAI-compatible APIs

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::models::{ChatMessage, LlmError, LlmProvider};
use super::Reasoner;
use async_trait::async_trait;

/// LLM HTTP Client
pub struct LlmClient {
    http_client: Client,
    provider: LlmProvider,
}

impl LlmClient {
    pub fn new(provider: LlmProvider) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(provider.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Api(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client, provider })
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Call the chat completion API and return the assistant text
    pub async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let api_key = self
            .provider
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::Api("API key not configured".to_string()))?;

        let chat_request = ChatCompletionRequest {
            model: self.provider.model_name.clone(),
            messages: messages.to_vec(),
            max_tokens: Some(self.provider.max_tokens),
            temperature: Some(self.provider.temperature),
        };

        let url = format!("{}/chat/completions", self.provider.api_base.trim_end_matches('/'));

        tracing::debug!("Calling LLM API: {} with model {}", url, self.provider.model_name);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.provider.timeout_seconds))
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.provider.timeout_seconds)
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

        let chat_response: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;

        if let Some(usage) = &chat_response.usage {
            tracing::debug!(
                "LLM usage: {} prompt + {} completion tokens",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("Empty response from LLM".to_string()))
    }
}

#[async_trait]
impl Reasoner for LlmClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.chat_completion(messages).await
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
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
}
