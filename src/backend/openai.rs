//! OpenAI-compatible chat backend
//!
//! Talks to any OpenAI-compatible endpoint (Ollama's `/v1`, vLLM, LM Studio,
//! OpenAI itself) over `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LlmSettings;
use crate::error::{Error, Result};

use super::ChatModel;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API base URL (e.g., "http://localhost:11434/v1")
    pub base_url: String,

    /// API key (empty string for local servers like Ollama)
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retries on transient errors
    pub max_retries: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self::from(&LlmSettings::default())
    }
}

impl From<&LlmSettings> for OpenAiConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout_secs: settings.timeout_secs,
            max_retries: settings.max_retries,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// OpenAI API types (request/response)
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// ─────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────

/// Chat model served over an OpenAI-compatible HTTP API
pub struct OpenAiChatModel {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %config.base_url,
            model = %config.model,
            "OpenAI-compatible chat model configured"
        );

        Ok(Self { config, client })
    }

    /// Build the authorization header value (if API key is set)
    fn auth_header(&self) -> Option<String> {
        if self.config.api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.config.api_key))
        }
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::ConnectionTimeout {
                url: url.to_string(),
                timeout_secs: self.config.timeout_secs,
            }
        } else {
            Error::connection_failed(url, e.to_string())
        }
    }

    /// Map a non-success status to an error
    fn status_error(&self, status: StatusCode, body: &str) -> Error {
        if status == StatusCode::NOT_FOUND && body.to_lowercase().contains("not found") {
            return Error::ModelNotFound {
                model: self.config.model.clone(),
                available: Vec::new(),
            };
        }
        Error::LlmResponse {
            message: format!("API error {}: {}", status, body.trim()),
            retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.config.temperature,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                debug!(attempt, ?backoff, "Retrying after error");
                tokio::time::sleep(backoff).await;
            }

            let mut req = self.client.post(&url).json(&body);
            if let Some(ref auth) = self.auth_header() {
                req = req.header("Authorization", auth);
            }

            let response = match req.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(attempt, error = %e, "Retryable connection error");
                    last_error = Some(self.transport_error(&url, e));
                    continue;
                }
                Err(e) => return Err(self.transport_error(&url, e)),
            };

            let status = response.status();
            if status.is_success() {
                let parsed: ChatCompletionResponse =
                    response.json().await.map_err(|e| Error::LlmResponse {
                        message: format!("Failed to parse API response: {}", e),
                        retryable: false,
                    })?;

                return parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|choice| choice.message.content.unwrap_or_default())
                    .ok_or_else(|| Error::LlmResponse {
                        message: "No choices in API response".to_string(),
                        retryable: false,
                    });
            }

            let text = response.text().await.unwrap_or_default();
            let err = self.status_error(status, &text);
            if !err.is_retryable() {
                return Err(err);
            }
            warn!(status = %status, attempt, "Retryable API error");
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| Error::LlmResponse {
            message: "All retry attempts exhausted".to_string(),
            retryable: true,
        }))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.config.base_url);
        let mut req = self.client.get(&url);
        if let Some(ref auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let response = req.send().await.map_err(|e| self.transport_error(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::LlmResponse {
                message: format!("API error {}: {}", status, text.trim()),
                retryable: status.is_server_error(),
            });
        }

        let list: ModelList = response.json().await.map_err(|e| Error::LlmResponse {
            message: format!("Failed to parse model list: {}", e),
            retryable: false,
        })?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
