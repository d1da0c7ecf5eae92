//! Default values for ArchScope configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// LLM Defaults
// ============================================================================

/// Default LLM provider.
pub const DEFAULT_LLM_PROVIDER: &str = "openai";

/// Default max tokens for LLM responses. Annotations are short JSON objects.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Upper bound for a single collaborator request, in seconds.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

// OpenAI defaults
/// Default OpenAI API URL.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
/// Default OpenAI model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

// Anthropic defaults
/// Default Anthropic API URL.
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
/// Default Anthropic model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
/// Default Anthropic API version.
pub const DEFAULT_ANTHROPIC_API_VERSION: &str = "2023-06-01";

// Ollama defaults
/// Default Ollama API URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/v1";
/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

// OpenRouter defaults
/// Default OpenRouter API URL.
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

// ============================================================================
// Storage Defaults
// ============================================================================

/// Default data directory. Holds one workspace per project.
pub const DEFAULT_DATA_DIR: &str = ".archscope";

/// Default database subdirectory under the data directory.
pub const DEFAULT_DATABASE_DIR: &str = "graph.db";

/// Default name of the fact file inside a project workspace.
pub const DEFAULT_FACTS_FILE: &str = "analysis.json";

/// Default name of the source snippet map inside a project workspace.
pub const DEFAULT_SNIPPETS_FILE: &str = "snippets.json";

// ============================================================================
// Graph Defaults
// ============================================================================

/// Whether the builder emits an explicit Project root node.
pub const DEFAULT_MATERIALIZE_PROJECT_ROOT: bool = true;

// ============================================================================
// Analysis Defaults
// ============================================================================

/// Default timeout for the external static analyzer (30 minutes).
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 30 * 60;

/// Default error context length in status messages.
pub const DEFAULT_ERROR_CONTEXT_LENGTH: usize = 500;

// ============================================================================
// Server Defaults
// ============================================================================

/// Default bind address for `archscope serve`.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default port for `archscope serve`.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

// ============================================================================
// System Prompts
// ============================================================================

/// Default system prompt for the annotation pass.
pub const DEFAULT_ANNOTATION_SYSTEM_PROMPT: &str = r#"You are a software architect documenting a C++ codebase.

You receive one element of the codebase at a time (a function, a type, a namespace, a file, a folder or the whole project), together with short descriptions of the elements it is built from.

Answer with a single JSON object that matches the requested structure exactly.
Keep "description" to one or two sentences. Do not invent components that are not mentioned.

Only output the JSON, no additional text."#;
