use thiserror::Error;

/// Failures of a text-generation call.
///
/// The annotation pass never propagates these: a failed call becomes the
/// node's `(Analysis failed)` annotation and the traversal moves on.
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("No API key configured (set ARCHSCOPE_LLM_API_KEY or the provider's own variable)")]
    MissingApiKey,

    #[error("Unknown LLM provider '{0}' (expected openai, anthropic or ollama)")]
    UnknownProvider(String),

    /// The request could not be built or was refused before reaching the model.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    #[error("LLM endpoint returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("LLM endpoint is rate limiting requests")]
    RateLimited,

    #[error("LLM request exceeded its timeout")]
    Timeout,

    #[error("Could not reach LLM endpoint: {0}")]
    Network(String),

    /// The response body, or the JSON the model was asked for, did not parse.
    #[error("Unreadable LLM response: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for LLMError {
    fn from(err: reqwest::Error) -> Self {
        match err {
            e if e.is_timeout() => LLMError::Timeout,
            e if e.is_builder() => LLMError::RequestFailed(e.to_string()),
            e => LLMError::Network(e.to_string()),
        }
    }
}
