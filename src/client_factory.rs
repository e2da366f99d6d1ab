//! Completion Client Factory
//!
//! Constructs the completion client for the backend selected via
//! `AGENT_BACKEND`. Clients are stateless after construction and shared
//! via `Arc`, so they are built once at process start and injected into
//! the agent rather than cached behind lazy globals.

use anyhow::Result;
use std::sync::Arc;

use crate::anthropic_client::AnthropicClient;
use crate::backend::AgentBackend;
use crate::completion::CompletionClient;
use crate::ollama_client::OllamaClient;
use crate::openai_client::OpenAiClient;

/// Create a completion client from environment variables
pub fn create_completion_client() -> Result<Arc<dyn CompletionClient>> {
    let backend = AgentBackend::from_env()?;
    create_for_backend(backend)
}

/// Create a completion client for a specific backend
pub fn create_for_backend(backend: AgentBackend) -> Result<Arc<dyn CompletionClient>> {
    let client: Arc<dyn CompletionClient> = match backend {
        AgentBackend::Anthropic => Arc::new(AnthropicClient::from_env()?),
        AgentBackend::OpenAi => Arc::new(OpenAiClient::from_env()?),
        AgentBackend::Ollama => Arc::new(OllamaClient::from_env()?),
    };

    tracing::info!(
        provider = client.provider_name(),
        model = client.model_name(),
        "completion client ready"
    );

    Ok(client)
}
