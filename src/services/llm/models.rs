//! LLM Data Models
//!
//! Provider configuration, chat message types and the LLM error enum.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// LLM provider configuration (OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProvider {
    pub api_base: String,
    pub model_name: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f64 {
    0.3
}
fn default_timeout() -> u64 {
    120
}

/// One message of a chat transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
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

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),

    #[error("Failed to serialize LLM request: {0}")]
    Serialization(#[from] serde_json::Error),
}
