//! External static analysis.
//!
//! The analyzer itself is a separate tool; this module only runs it and
//! locates the fact file it writes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{AnalysisConfig, DEFAULT_ERROR_CONTEXT_LENGTH};

/// Errors raised while running the analyzer.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No analyzer command configured (set [analysis] command)")]
    NotConfigured,

    #[error("Failed to start analyzer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Analyzer timed out after {0} seconds")]
    Timeout(u64),

    #[error("Analyzer failed with code {code}.\nLogs:\n{logs}")]
    Failed { code: i32, logs: String },

    #[error("Analyzer finished without writing {0}")]
    MissingOutput(PathBuf),
}

/// Produces a fact file for a source tree.
#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    /// Analyzes `source_dir` and writes the fact set into `output_dir`.
    /// Returns the path of the written fact file.
    async fn analyze(&self, source_dir: &Path, output_dir: &Path) -> Result<PathBuf, AnalysisError>;
}

/// Runs the analyzer as a subprocess.
///
/// Arguments may contain `{input}` (source directory) and `{output}`
/// (output directory) placeholders.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    command: Vec<String>,
    timeout: Duration,
    facts_file: String,
}

impl CommandAnalyzer {
    pub fn new(command: Vec<String>, facts_file: impl Into<String>) -> Self {
        Self {
            command,
            timeout: AnalysisConfig::default().timeout(),
            facts_file: facts_file.into(),
        }
    }

    pub fn from_config(config: &AnalysisConfig, facts_file: impl Into<String>) -> Self {
        Self::new(config.command.clone(), facts_file).with_timeout(config.timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn argv(&self, source_dir: &Path, output_dir: &Path) -> Vec<String> {
        let input = source_dir.display().to_string();
        let output = output_dir.display().to_string();
        self.command
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

#[async_trait]
impl StaticAnalyzer for CommandAnalyzer {
    async fn analyze(&self, source_dir: &Path, output_dir: &Path) -> Result<PathBuf, AnalysisError> {
        let argv = self.argv(source_dir, output_dir);
        let Some((program, args)) = argv.split_first() else {
            return Err(AnalysisError::NotConfigured);
        };

        info!(program = %program, source = %source_dir.display(), "Running static analysis");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AnalysisError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let mut logs = String::from_utf8_lossy(&output.stderr).into_owned();
            if logs.trim().is_empty() {
                logs = String::from_utf8_lossy(&output.stdout).into_owned();
            }
            return Err(AnalysisError::Failed {
                code: output.status.code().unwrap_or(-1),
                logs: tail(&logs, DEFAULT_ERROR_CONTEXT_LENGTH),
            });
        }

        let facts = output_dir.join(&self.facts_file);
        if !facts.exists() {
            return Err(AnalysisError::MissingOutput(facts));
        }
        debug!(facts = %facts.display(), "Static analysis finished");
        Ok(facts)
    }
}

/// Last `max` characters of `text`.
fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let analyzer = CommandAnalyzer::new(
            vec!["parse".to_string(), "--in={input}".to_string(), "{output}".to_string()],
            "analysis.json",
        );
        let argv = analyzer.argv(Path::new("/src"), Path::new("/out"));
        assert_eq!(argv, vec!["parse", "--in=/src", "/out"]);
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 2), "ef");
        assert_eq!(tail("ab", 5), "ab");
    }

    #[tokio::test]
    async fn test_empty_command_is_not_configured() {
        let dir = TempDir::new().unwrap();
        let analyzer = CommandAnalyzer::new(Vec::new(), "analysis.json");
        let err = analyzer.analyze(dir.path(), dir.path()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NotConfigured));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_returns_fact_path() {
        let dir = TempDir::new().unwrap();
        let analyzer = CommandAnalyzer::new(sh("echo '{}' > {output}/analysis.json"), "analysis.json");
        let path = analyzer.analyze(dir.path(), dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("analysis.json"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let analyzer = CommandAnalyzer::new(sh("echo boom >&2; exit 3"), "analysis.json");
        let err = analyzer.analyze(dir.path(), dir.path()).await.unwrap_err();
        match err {
            AnalysisError::Failed { code, logs } => {
                assert_eq!(code, 3);
                assert!(logs.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_output() {
        let dir = TempDir::new().unwrap();
        let analyzer = CommandAnalyzer::new(sh("true"), "analysis.json");
        let err = analyzer.analyze(dir.path(), dir.path()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::MissingOutput(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let dir = TempDir::new().unwrap();
        let analyzer = CommandAnalyzer::new(sh("sleep 5"), "analysis.json")
            .with_timeout(Duration::from_millis(100));
        let err = analyzer.analyze(dir.path(), dir.path()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout(_)));
    }
}
