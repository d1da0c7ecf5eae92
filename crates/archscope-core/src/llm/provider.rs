use super::{ClaudeClient, LLMError, OpenAIClient, LLM};
use crate::config::{LLMConfig, DEFAULT_ANTHROPIC_API_VERSION, DEFAULT_OLLAMA_URL};

/// LLM provider selection, resolved from [`LLMConfig`].
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI-compatible endpoint (default, most universal)
    OpenAI {
        base_url: String,
        api_key: Option<String>,
        model: String,
    },
    /// Anthropic Claude
    Anthropic {
        api_url: String,
        api_key: Option<String>,
        api_version: String,
        model: String,
    },
    /// Local Ollama instance
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Resolves a provider from configuration, filling defaults and API keys
    /// from the environment.
    pub fn from_config(config: &LLMConfig) -> Result<Self, LLMError> {
        let model = config.model_or_default();
        match config.provider.as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic {
                api_url: config.base_url_or_default(),
                api_key: config.api_key_or_env(),
                api_version: config
                    .api_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_VERSION.to_string()),
                model,
            }),
            "ollama" => {
                let base_url = config
                    .base_url
                    .clone()
                    .or_else(|| {
                        std::env::var("OLLAMA_HOST")
                            .ok()
                            .map(|h| format!("{}/v1", h.trim_end_matches('/')))
                    })
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
                Ok(Provider::Ollama { base_url, model })
            }
            "openai" | "openrouter" | "openai-compatible" => Ok(Provider::OpenAI {
                base_url: config.base_url_or_default(),
                api_key: config.api_key_or_env(),
                model,
            }),
            other => Err(LLMError::UnknownProvider(other.to_string())),
        }
    }

    /// Creates an LLM client with the token budget and timeout from `config`.
    pub fn build(self, config: &LLMConfig) -> Result<Box<dyn LLM>, LLMError> {
        match self {
            Provider::OpenAI {
                base_url,
                api_key,
                model,
            } => Ok(Box::new(
                OpenAIClient::new(base_url, api_key.unwrap_or_default(), model)
                    .with_max_tokens(config.max_tokens)
                    .with_timeout(config.timeout()),
            )),

            Provider::Anthropic {
                api_url,
                api_key,
                api_version,
                model,
            } => {
                let key = api_key.ok_or(LLMError::MissingApiKey)?;
                Ok(Box::new(
                    ClaudeClient::new(key)
                        .with_api_url(api_url)
                        .with_api_version(api_version)
                        .with_model(model)
                        .with_max_tokens(config.max_tokens)
                        .with_timeout(config.timeout()),
                ))
            }

            Provider::Ollama { base_url, model } => Ok(Box::new(
                OpenAIClient::new(base_url, "", model)
                    .with_max_tokens(config.max_tokens)
                    .with_timeout(config.timeout()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> LLMConfig {
        LLMConfig {
            provider: provider.to_string(),
            ..LLMConfig::default()
        }
    }

    #[test]
    fn test_ollama_provider_build() {
        let mut cfg = config("ollama");
        cfg.model = Some("codellama".to_string());
        cfg.base_url = Some("http://gpu-box:11434/v1".to_string());

        let provider = Provider::from_config(&cfg).unwrap();
        assert!(matches!(
            &provider,
            Provider::Ollama { model, base_url } if model == "codellama" && base_url == "http://gpu-box:11434/v1"
        ));
        assert!(provider.build(&cfg).is_ok());
    }

    #[test]
    fn test_openai_provider_build() {
        let mut cfg = config("openai");
        cfg.base_url = Some("http://localhost:8080/v1".to_string());
        cfg.api_key = Some("test".to_string());

        let provider = Provider::from_config(&cfg).unwrap();
        assert!(matches!(provider, Provider::OpenAI { .. }));
        assert!(provider.build(&cfg).is_ok());
    }

    #[test]
    fn test_anthropic_requires_key() {
        let provider = Provider::Anthropic {
            api_url: "http://localhost".to_string(),
            api_key: None,
            api_version: DEFAULT_ANTHROPIC_API_VERSION.to_string(),
            model: "m".to_string(),
        };
        assert!(matches!(
            provider.build(&config("anthropic")),
            Err(LLMError::MissingApiKey)
        ));
    }

    #[test]
    fn test_unknown_provider() {
        let result = Provider::from_config(&config("carrier-pigeon"));
        assert!(matches!(result, Err(LLMError::UnknownProvider(p)) if p == "carrier-pigeon"));
    }
}
