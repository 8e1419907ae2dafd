//! OpenAI-compatible chat completion provider

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    llm::{
        errors::{LlmError, LlmResult},
        provider::{extract_error_message, LlmProvider},
        types::{ChatRequest, FinishReason, ProviderConfig, ProviderResponse, TokenUsage},
    },
    utils::retry::{exponential_backoff_with_jitter, RetryOptions},
};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
    options: RetryOptions,
    name: &'static str,
    default_base_url: &'static str,
}

impl OpenAIProvider {
    /// Provider for the hosted OpenAI API; an API key is required
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(LlmError::ConfigError("API key is required".to_string()));
        }
        Self::build(config, "openai", OPENAI_BASE_URL)
    }

    /// Provider for a local Ollama server through its OpenAI-compatible API
    pub fn ollama(config: ProviderConfig) -> LlmResult<Self> {
        Self::build(config, "ollama", OLLAMA_BASE_URL)
    }

    fn build(
        config: ProviderConfig,
        name: &'static str,
        default_base_url: &'static str,
    ) -> LlmResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = config.api_key.as_deref().filter(|key| !key.is_empty()) {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlmError::ConfigError(format!("Invalid API key: {}", e)))?;
            headers.insert(AUTHORIZATION, auth_value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Completions are slow compared to the social API.
        let options = RetryOptions {
            timeout_seconds: 120,
            retry_delay_ms: 1000,
            ..RetryOptions::default()
        };
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(options.timeout_seconds))
            .user_agent(&options.user_agent)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            options,
            name,
            default_base_url,
        })
    }

    fn endpoint(&self) -> String {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(self.default_base_url)
            .trim_end_matches('/');
        format!("{}/v1/chat/completions", base_url)
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": request.messages,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens.or(self.config.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature.or(self.config.temperature) {
            body["temperature"] = json!(temperature);
        }
        body
    }

    /// Execute request with retries
    async fn execute_request(&self, body: &serde_json::Value) -> LlmResult<OpenAIResponse> {
        let mut attempt = 0;
        loop {
            match self.send(body).await {
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() && attempt < self.options.max_retries => {
                    warn!("{} request failed, retrying: {}", self.name, error);
                    attempt += 1;
                    exponential_backoff_with_jitter(attempt, self.options.retry_delay_ms).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn send(&self, body: &serde_json::Value) -> LlmResult<OpenAIResponse> {
        let response = self.client.post(self.endpoint()).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<OpenAIResponse>().await?);
        }

        let message = extract_error_message(response).await;
        Err(match status.as_u16() {
            429 => LlmError::RateLimitError(message),
            401 | 403 => LlmError::AuthError(message),
            408 => LlmError::TimeoutError(message),
            400 if message.contains("context_length_exceeded") => LlmError::ContextLimitError(message),
            _ => LlmError::ApiError(message),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn chat_completion(&self, request: ChatRequest) -> LlmResult<ProviderResponse> {
        let body = self.request_body(&request);
        debug!("Sending {} messages to {} ({})", request.messages.len(), self.name, self.config.model);

        let response = self.execute_request(&body).await?;
        response.into_provider_response()
    }

    fn name(&self) -> &str {
        self.name
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn validate_config(&self) -> LlmResult<()> {
        if self.config.model.is_empty() {
            return Err(LlmError::ConfigError("Model is required".to_string()));
        }
        if let Some(temperature) = self.config.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(LlmError::ConfigError(format!(
                    "Temperature must be between 0 and 2, got {}",
                    temperature
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAIResponse {
    fn into_provider_response(self) -> LlmResult<ProviderResponse> {
        let usage = self
            .usage
            .map(|usage| TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            })
            .unwrap_or_default();

        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ApiError("No choices in response".to_string()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") => Some(FinishReason::Stop),
            Some("length") => Some(FinishReason::Length),
            Some("content_filter") => Some(FinishReason::ContentFilter),
            _ => None,
        };

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Message;

    fn config() -> ProviderConfig {
        ProviderConfig {
            api_key: Some("sk-test".to_string()),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_openai_requires_api_key() {
        let err = OpenAIProvider::new(ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, LlmError::ConfigError(_)));
        assert!(OpenAIProvider::new(config()).is_ok());
    }

    #[test]
    fn test_endpoint_honors_base_url() {
        let provider = OpenAIProvider::new(config()).unwrap();
        assert_eq!(provider.endpoint(), "https://api.openai.com/v1/chat/completions");

        let local = OpenAIProvider::ollama(ProviderConfig {
            base_url: Some("http://gpu-box:11434/".to_string()),
            ..ProviderConfig::default()
        })
        .unwrap();
        assert_eq!(local.endpoint(), "http://gpu-box:11434/v1/chat/completions");
    }

    #[test]
    fn test_request_body_prefers_request_temperature() {
        let provider = OpenAIProvider::new(config()).unwrap();
        let request = ChatRequest::new(vec![Message::new_system("sort"), Message::new_user("[]")])
            .with_temperature(0.9);

        let body = provider.request_body(&request);
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "[]");
        assert!((body["temperature"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_response_conversion() {
        let response: OpenAIResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "{\"lists\": []}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();
        let converted = response.into_provider_response().unwrap();
        assert_eq!(converted.content, "{\"lists\": []}");
        assert_eq!(converted.finish_reason, Some(FinishReason::Stop));
        assert_eq!(converted.usage.total_tokens, 15);

        let empty: OpenAIResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(empty.into_provider_response(), Err(LlmError::ApiError(_))));
    }

    #[test]
    fn test_validate_config_rejects_bad_temperature() {
        let provider = OpenAIProvider::new(ProviderConfig {
            temperature: Some(3.0),
            ..config()
        })
        .unwrap();
        assert!(provider.validate_config().is_err());
    }
}
