//! Provider trait and factory for LLM providers

use async_trait::async_trait;

use crate::llm::{
    errors::{LlmError, LlmResult},
    openai::OpenAIProvider,
    types::{ChatRequest, ProviderConfig, ProviderResponse},
};

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and get a response
    async fn chat_completion(&self, request: ChatRequest) -> LlmResult<ProviderResponse>;

    fn name(&self) -> &str;

    fn model(&self) -> &str;

    fn validate_config(&self) -> LlmResult<()>;
}

/// Factory for creating LLM providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Build the configured provider and check its settings
    pub fn create_provider(config: ProviderConfig) -> LlmResult<Box<dyn LlmProvider>> {
        let provider: Box<dyn LlmProvider> = match config.provider_type.as_str() {
            "openai" => Box::new(OpenAIProvider::new(config)?),
            "ollama" => Box::new(OpenAIProvider::ollama(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported provider type: {} (available: {})",
                    config.provider_type,
                    Self::available_providers().join(", ")
                )))
            }
        };
        provider.validate_config()?;
        Ok(provider)
    }

    pub fn available_providers() -> Vec<&'static str> {
        vec!["openai", "ollama"]
    }
}

/// Extract error message from an HTTP error response
pub async fn extract_error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) => error_message(status, &text),
        Err(_) => format!("{}: Failed to read error response", status),
    }
}

fn error_message(status: reqwest::StatusCode, text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|json| {
            json.get("error")?
                .get("message")?
                .as_str()
                .map(|message| format!("{}: {}", status, message))
        })
        .unwrap_or_else(|| format!("{}: {}", status, text))
}
