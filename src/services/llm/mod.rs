//! LLM Module
//!
//! The LLM is treated as a `Reasoner` capability: a chat transcript in,
//! assistant text out. All correctness-critical decisions stay in the
//! deterministic profiler; the reasoner only drives exploration and
//! writes human-readable notes.

mod client;
mod models;

pub use client::LlmClient;
pub use models::{ChatMessage, LlmError, LlmProvider};

use async_trait::async_trait;

/// Chat capability the agent loops run against.
///
/// Production uses `LlmClient`; tests substitute a scripted reasoner.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}
