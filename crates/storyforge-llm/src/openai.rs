//! OpenAI-compatible chat-completions adapter.
//!
//! The default endpoint is Google's OpenAI-compatibility surface, which is how
//! the service talks to Gemini; any server speaking the same protocol works by
//! overriding the base URL.

use async_trait::async_trait;
use serde_json::json;

use storyforge_types::{ForgeError, Result};

use crate::{CompletionRequest, TaskModel};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub struct OpenAiCompatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Read the API key from the environment; a missing key is a configuration
    /// error surfaced before any run starts.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| ForgeError::MissingConfig {
            key: API_KEY_ENV.into(),
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });
        if let Some(format) = &request.response_format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": format.name,
                    "strict": true,
                    "schema": format.schema,
                },
            });
        }
        body
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(provider: &str, status: u16, body: &str) -> ForgeError {
    match status {
        429 => ForgeError::RateLimited {
            provider: provider.into(),
            retry_after_ms: 1000,
        },
        401 | 403 => ForgeError::AuthError {
            provider: provider.into(),
        },
        500 | 502 | 503 => ForgeError::ProviderError {
            provider: provider.into(),
            status,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => ForgeError::ProviderError {
            provider: provider.into(),
            status,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// TaskModel implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl TaskModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(request);

        tracing::debug!(model = %self.model, structured = request.response_format.is_some(), "completion request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::ProviderError {
                provider: self.model.clone(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ForgeError::ProviderError {
            provider: self.model.clone(),
            status: 0,
            message: e.to_string(),
            retryable: true,
        })?;

        if !(200..300).contains(&status) {
            return Err(map_error(&self.model, status, &text));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ForgeError::ProviderError {
                provider: self.model.clone(),
                status,
                message: format!("response was not JSON: {e}"),
                retryable: false,
            })?;

        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ForgeError::ProviderError {
                provider: self.model.clone(),
                status,
                message: "response carried no message content".into(),
                retryable: false,
            })?;

        Ok(content.to_string())
    }
}
