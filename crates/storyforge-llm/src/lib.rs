//! External task-executor seam for the generation pipeline.
//!
//! Node handlers depend only on the [`TaskModel`] trait: a specification goes
//! in, free text or schema-constrained JSON comes back. Failures are generic
//! except for the transient signals ([`storyforge_types::ForgeError::RateLimited`],
//! retryable provider errors) that the retry wrapper classifies.

use async_trait::async_trait;

use storyforge_types::Result;

pub mod openai;

pub use openai::OpenAiCompatModel;

/// Strict JSON-schema response constraint (OpenAI `json_schema` mode).
#[derive(Debug, Clone)]
pub struct ResponseFormat {
    pub name: &'static str,
    pub schema: serde_json::Value,
}

/// One completion call: a system instruction, a user payload, and an optional
/// structured-output constraint.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub response_format: Option<ResponseFormat>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            response_format: None,
        }
    }

    pub fn with_schema(mut self, name: &'static str, schema: serde_json::Value) -> Self {
        self.response_format = Some(ResponseFormat { name, schema });
        self
    }
}

/// An asynchronous task executor that turns a specification into text.
///
/// Implementations must surface rate limiting as
/// [`storyforge_types::ForgeError::RateLimited`] (or a retryable provider
/// error) so callers can distinguish transient failures.
#[async_trait]
pub trait TaskModel: Send + Sync {
    /// Provider identifier used in logs and error payloads.
    fn name(&self) -> &str;

    /// Run one completion. Returns the raw text of the model's reply; with a
    /// response format set, that text is the constrained JSON document.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
