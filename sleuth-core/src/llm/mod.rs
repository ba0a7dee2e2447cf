pub mod providers;

use serde::{Deserialize, Serialize};

/// Token usage from an LLM call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f64,
}

/// Common interface for LLM providers.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// The model ID being used.
    fn model_id(&self) -> &str;

    /// Call the LLM and return the response text + token usage.
    async fn call(
        &self,
        completion: &Completion<'_>,
    ) -> crate::error::Result<(String, TokenUsage)>;
}

// ── Tests ───────────────────────────────────────────────────────────
