//! Completion Client Trait
//!
//! Unified interface for the completion providers (Anthropic, OpenAI, Ollama).

use anyhow::Result;
use async_trait::async_trait;

/// Unified completion client interface
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Call the model with system + user prompts, return raw text response
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Call the model expecting a JSON response
    /// - OpenAI: uses response_format json_object mode
    /// - Anthropic/Ollama: adds a JSON-only instruction to the system prompt
    async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Model name for logging
    fn model_name(&self) -> &str;

    /// Provider name for logging
    fn provider_name(&self) -> &str;
}

/// Harden a system prompt for providers without a native JSON response mode
pub(crate) fn json_only(system_prompt: &str) -> String {
    format!(
        "{}\n\nIMPORTANT: Respond with valid JSON only. No markdown code blocks, no explanations.",
        system_prompt
    )
}
