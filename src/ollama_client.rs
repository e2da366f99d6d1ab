//! Ollama Client
//!
//! Completion client implementation for a locally-hosted Ollama server.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::completion::{json_only, CompletionClient};

/// Default Ollama model
const DEFAULT_MODEL: &str = "llama3";

/// Default Ollama server URL
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama chat API client
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Create a client for the given server URL and model
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// Create from environment variables (OLLAMA_BASE_URL, OLLAMA_MODEL)
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(Self::new(base_url, model))
    }

    /// Internal API call implementation
    async fn call_api(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&serde_json::json!({
                "model": &self.model,
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": user_prompt}
                ],
                "stream": false,
                "options": {"temperature": 0.0}
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            message: Message,
        }

        let api_response: ApiResponse = response.json().await?;
        Ok(api_response.message.content)
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call_api(system_prompt, user_prompt).await
    }

    async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        // Ollama has no json_object mode, rely on prompt hardening
        self.call_api(&json_only(system_prompt), user_prompt).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Ollama"
    }
}
