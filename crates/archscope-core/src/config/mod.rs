//! Configuration management for ArchScope.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `archscope.toml` file
//! 3. User config `~/.config/archscope/config.toml`
//! 4. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod defaults;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration.
    pub llm: LLMConfig,

    /// Storage configuration.
    pub storage: StorageConfig,

    /// Graph construction configuration.
    pub graph: GraphConfig,

    /// Annotation pass configuration.
    pub annotation: AnnotationConfig,

    /// External static analyzer configuration.
    pub analysis: AnalysisConfig,

    /// HTTP API configuration.
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./archscope.toml` (project local)
    /// 2. `~/.config/archscope/config.toml` (user config)
    /// 3. Falls back to defaults
    ///
    /// Environment overrides are applied in every case.
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new("archscope.toml").exists() {
            return Self::from_file("archscope.toml");
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("archscope").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // LLM overrides
        if let Ok(provider) = std::env::var("ARCHSCOPE_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("ARCHSCOPE_LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Ok(url) = std::env::var("ARCHSCOPE_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Ok(key) = std::env::var("ARCHSCOPE_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(tokens) = std::env::var("ARCHSCOPE_LLM_MAX_TOKENS") {
            if let Ok(n) = tokens.parse() {
                self.llm.max_tokens = n;
            }
        }

        // Storage overrides
        if let Ok(dir) = std::env::var("ARCHSCOPE_DATA_DIR") {
            self.storage.data_dir = dir;
        }

        // Annotation overrides
        if let Ok(enabled) = std::env::var("ARCHSCOPE_ANNOTATION_ENABLED") {
            if let Ok(b) = enabled.parse() {
                self.annotation.enabled = b;
            }
        }

        // Analysis overrides
        if let Ok(command) = std::env::var("ARCHSCOPE_ANALYSIS_COMMAND") {
            self.analysis.command = command.split_whitespace().map(str::to_string).collect();
        }
    }

    /// Reject settings no component can run with.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "llm.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.analysis.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "analysis.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// Provider name: "openai", "anthropic", "ollama", or "openrouter".
    pub provider: String,

    /// Model name (provider-specific).
    pub model: Option<String>,

    /// Base URL for API (for openai-compatible providers).
    pub base_url: Option<String>,

    /// API key (can also be set via environment variable).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Maximum tokens for response.
    pub max_tokens: u32,

    /// API version (for Anthropic).
    pub api_version: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_LLM_PROVIDER.to_string(),
            model: None,
            base_url: None,
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: Some(DEFAULT_ANTHROPIC_API_VERSION.to_string()),
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

impl LLMConfig {
    /// Get the model name, falling back to provider defaults.
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| match self.provider.as_str() {
            "anthropic" | "claude" => DEFAULT_ANTHROPIC_MODEL.to_string(),
            "ollama" => DEFAULT_OLLAMA_MODEL.to_string(),
            _ => DEFAULT_OPENAI_MODEL.to_string(),
        })
    }

    /// Get the base URL, falling back to provider defaults.
    pub fn base_url_or_default(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| match self.provider.as_str() {
            "anthropic" | "claude" => DEFAULT_ANTHROPIC_URL.to_string(),
            "ollama" => DEFAULT_OLLAMA_URL.to_string(),
            "openrouter" => DEFAULT_OPENROUTER_URL.to_string(),
            _ => DEFAULT_OPENAI_URL.to_string(),
        })
    }

    /// Get API key from config or environment.
    pub fn api_key_or_env(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("ARCHSCOPE_LLM_API_KEY").ok())
            .or_else(|| match self.provider.as_str() {
                "anthropic" | "claude" => std::env::var("ANTHROPIC_API_KEY").ok(),
                "openrouter" => std::env::var("OPENROUTER_API_KEY").ok(),
                _ => std::env::var("OPENAI_API_KEY").ok(),
            })
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for ArchScope data (default: ".archscope").
    pub data_dir: String,

    /// Database directory name under `data_dir`.
    pub database_dir: String,

    /// Fact file name inside each project workspace.
    pub facts_file: String,

    /// Snippet map file name inside each project workspace.
    pub snippets_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            database_dir: DEFAULT_DATABASE_DIR.to_string(),
            facts_file: DEFAULT_FACTS_FILE.to_string(),
            snippets_file: DEFAULT_SNIPPETS_FILE.to_string(),
        }
    }
}

impl StorageConfig {
    /// Full path to the embedded database.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.database_dir)
    }

    /// Full path to the directory that holds project workspaces.
    pub fn projects_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("projects")
    }
}

/// Which structural edge wins when a node has both a physical and a logical parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentPreference {
    /// `contains`/`declares`/`includes` first; the file tree drives the hierarchy.
    #[default]
    Physical,
    /// `encapsulates`/`encloses` first; classes and namespaces nest their members.
    Logical,
}

/// Graph construction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Emit a Project node above the first folder level.
    pub materialize_project_root: bool,

    /// Parent resolution order.
    pub parent_preference: ParentPreference,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            materialize_project_root: DEFAULT_MATERIALIZE_PROJECT_ROOT,
            parent_preference: ParentPreference::default(),
        }
    }
}

/// Annotation pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// When false, summarize requests are rejected.
    pub enabled: bool,

    /// System prompt for the annotation pass.
    /// If not set, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Maximum length of error context in status messages.
    pub error_context_length: usize,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            system_prompt: None,
            error_context_length: DEFAULT_ERROR_CONTEXT_LENGTH,
        }
    }
}

impl AnnotationConfig {
    /// System prompt, falling back to the built-in default.
    pub fn system_prompt_or_default(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_ANNOTATION_SYSTEM_PROMPT)
    }
}

/// External static analyzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analyzer argv. `{input}` is replaced by the source directory and
    /// `{output}` by the project workspace directory.
    pub command: Vec<String>,

    /// Timeout for one analyzer run in seconds.
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
        }
    }
}

impl AnalysisConfig {
    /// Analyzer timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, DEFAULT_LLM_PROVIDER);
        assert_eq!(config.storage.data_dir, DEFAULT_DATA_DIR);
        assert!(config.graph.materialize_project_root);
        assert_eq!(config.graph.parent_preference, ParentPreference::Physical);
        assert!(config.annotation.enabled);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[llm]"));
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[graph]"));
        assert!(!toml_str.contains("api_key"));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[llm]
provider = "ollama"
model = "llama3"

[storage]
data_dir = ".custom-archscope"

[graph]
materialize_project_root = false
parent_preference = "logical"

[analysis]
command = ["rascal-cpp", "{input}", "{output}"]
timeout_secs = 60
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, Some("llama3".to_string()));
        assert_eq!(config.storage.data_dir, ".custom-archscope");
        assert!(!config.graph.materialize_project_root);
        assert_eq!(config.graph.parent_preference, ParentPreference::Logical);
        assert_eq!(config.analysis.command.len(), 3);
        assert_eq!(config.analysis.timeout(), Duration::from_secs(60));
        // untouched sections keep defaults
        assert_eq!(config.server.port, DEFAULT_SERVER_PORT);
    }

    #[test]
    fn test_model_or_default() {
        let mut config = LLMConfig::default();

        config.provider = "anthropic".to_string();
        assert_eq!(config.model_or_default(), DEFAULT_ANTHROPIC_MODEL);

        config.provider = "ollama".to_string();
        assert_eq!(config.model_or_default(), DEFAULT_OLLAMA_MODEL);

        config.model = Some("custom-model".to_string());
        assert_eq!(config.model_or_default(), "custom-model");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.llm.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_storage_paths() {
        let config = StorageConfig {
            data_dir: "/var/lib/archscope".to_string(),
            ..StorageConfig::default()
        };
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/archscope/graph.db")
        );
        assert_eq!(
            config.projects_path(),
            PathBuf::from("/var/lib/archscope/projects")
        );
    }
}
