//! Text-generation collaborator used by the annotation pass.

mod claude;
mod error;
mod openai;
mod provider;

pub use claude::ClaudeClient;
pub use error::LLMError;
pub use openai::OpenAIClient;
pub use provider::Provider;

use std::time::Duration;

use async_trait::async_trait;

/// Trait for Large Language Model providers.
///
/// Every implementation must return in bounded time: the HTTP clients carry a
/// request timeout and surface it as [`LLMError::Timeout`].
///
/// # Supported Providers
///
/// - **OpenAI-compatible** (default): OpenAI, Azure, Ollama, vLLM, OpenRouter, etc.
/// - **Anthropic**: Claude models via the messages API
///
/// # Example
///
/// ```ignore
/// use archscope_core::llm::{Provider, LLM};
///
/// let llm = Provider::from_config(&config.llm)?.build(&config.llm)?;
/// let response = llm.complete_with_system(system, "Describe main()").await?;
/// ```
#[async_trait]
pub trait LLM: Send + Sync {
    /// Complete a prompt and return the response.
    async fn complete(&self, prompt: &str) -> Result<String, LLMError>;

    /// Complete a prompt with a system message.
    async fn complete_with_system(&self, system: &str, prompt: &str)
        -> Result<String, LLMError>;
}

/// Blanket implementation for boxed trait objects.
#[async_trait]
impl LLM for Box<dyn LLM> {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        (**self).complete(prompt).await
    }

    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, LLMError> {
        (**self).complete_with_system(system, prompt).await
    }
}

/// Shared clients are handed to background jobs as `Arc<dyn LLM>`.
#[async_trait]
impl LLM for std::sync::Arc<dyn LLM> {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        (**self).complete(prompt).await
    }

    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, LLMError> {
        (**self).complete_with_system(system, prompt).await
    }
}

/// HTTP client with a hard per-request timeout. Falls back to the default
/// client only when the TLS backend cannot be initialized.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}
