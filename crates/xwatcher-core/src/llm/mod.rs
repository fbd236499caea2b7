//! LLM provider abstraction, OpenAI-compatible client, and fallback router.
//!
//! Provides a trait-based abstraction over chat-completion providers with
//! typed responses and token usage tracking, plus a router that walks an
//! ordered provider chain with per-provider timeout and retry policy.

pub mod openai_compat;
pub mod router;

use crate::error::LlmError;

/// Token usage information from an LLM completion.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,
    /// Number of tokens in the completion.
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens across prompt and completion.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Accumulate token counts from another usage record.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Response from an LLM completion request.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,
    /// Token usage for this completion.
    pub usage: TokenUsage,
    /// The model that produced this response.
    pub model: String,
}

/// Parameters controlling LLM generation behavior.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Trait abstracting a chat-completion provider.
///
/// Object-safe so the router can hold a `Box<dyn LlmProvider>` chain.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the display name of this provider (e.g. "openrouter").
    fn name(&self) -> &str;

    /// Returns the configured model identifier.
    fn model(&self) -> &str;

    /// Send a completion request to the LLM.
    async fn complete(&self, prompt: &str, params: &GenerationParams)
        -> Result<LlmResponse, LlmError>;
}
