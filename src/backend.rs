//! Backend Selection
//!
//! Enum for selecting the completion provider (Anthropic, OpenAI, Ollama).

use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Completion backend provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentBackend {
    /// Anthropic Claude (default)
    #[default]
    Anthropic,
    /// OpenAI GPT
    OpenAi,
    /// Locally-hosted Ollama
    Ollama,
}

impl AgentBackend {
    /// Create from AGENT_BACKEND environment variable
    ///
    /// Valid values: "anthropic", "claude", "openai", "gpt", "ollama", "local"
    /// Defaults to Anthropic if not set
    pub fn from_env() -> Result<Self> {
        let value = std::env::var("AGENT_BACKEND").unwrap_or_else(|_| "anthropic".to_string());
        value
            .parse()
            .map_err(|e: ParseBackendError| anyhow!("{}", e))
    }

    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "Anthropic",
            AgentBackend::OpenAi => "OpenAI",
            AgentBackend::Ollama => "Ollama",
        }
    }
}

/// Error type for parsing AgentBackend
#[derive(Debug)]
pub struct ParseBackendError(String);

impl std::fmt::Display for ParseBackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseBackendError {}

impl FromStr for AgentBackend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(AgentBackend::Anthropic),
            "openai" | "gpt" => Ok(AgentBackend::OpenAi),
            "ollama" | "local" => Ok(AgentBackend::Ollama),
            other => Err(ParseBackendError(format!(
                "Unknown AGENT_BACKEND '{}'. Valid values: anthropic, claude, openai, gpt, ollama, local",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AgentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
