use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{StorageConfig, DEFAULT_FACTS_FILE, DEFAULT_SNIPPETS_FILE};
use crate::facts::{FactError, FactSet};

/// Errors raised by [`Workspace`].
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Analysis file missing: {0}")]
    NotFound(PathBuf),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkspaceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkspaceError::NotFound(_))
    }
}

/// Per-project working directories.
///
/// ```text
/// {data_dir}/projects/{project-id}/
///   analysis.json     # analyzer output (fact set)
///   snippets.json     # optional node id -> source text
/// ```
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    facts_file: String,
    snippets_file: String,
}

impl Workspace {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.projects_path(),
            facts_file: config.facts_file.clone(),
            snippets_file: config.snippets_file.clone(),
        }
    }

    /// Workspace rooted at `root` with the default file names.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            facts_file: DEFAULT_FACTS_FILE.to_string(),
            snippets_file: DEFAULT_SNIPPETS_FILE.to_string(),
        }
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    pub fn facts_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join(&self.facts_file)
    }

    pub fn snippets_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join(&self.snippets_file)
    }

    pub fn facts_file(&self) -> &str {
        &self.facts_file
    }

    /// Creates the project directory if needed and returns it.
    pub fn ensure_project_dir(&self, project_id: &str) -> Result<PathBuf, WorkspaceError> {
        let dir = self.project_dir(project_id);
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| WorkspaceError::io(&dir, e))?;
        }
        Ok(dir)
    }

    /// Reads the saved fact set. A missing file is [`WorkspaceError::NotFound`].
    pub fn load_facts(&self, project_id: &str) -> Result<FactSet, WorkspaceError> {
        let path = self.facts_path(project_id);
        FactSet::load(&path).map_err(|e| match e {
            FactError::NotFound(_) => WorkspaceError::NotFound(path.clone()),
            FactError::Io(source) => WorkspaceError::io(&path, source),
            FactError::Json(e) => WorkspaceError::Json(e),
        })
    }

    pub fn save_facts(&self, project_id: &str, facts: &FactSet) -> Result<(), WorkspaceError> {
        self.ensure_project_dir(project_id)?;
        let path = self.facts_path(project_id);
        let json = serde_json::to_string(facts)?;
        fs::write(&path, json).map_err(|e| WorkspaceError::io(&path, e))
    }

    /// Operation source snippets; empty when the analyzer wrote none.
    pub fn load_snippets(&self, project_id: &str) -> Result<HashMap<String, String>, WorkspaceError> {
        let path = self.snippets_path(project_id);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| WorkspaceError::io(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Deletes the project directory. Missing directories are fine.
    pub fn remove(&self, project_id: &str) -> Result<(), WorkspaceError> {
        let dir = self.project_dir(project_id);
        remove_dir_if_exists(&dir)
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), WorkspaceError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkspaceError::io(dir, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_facts_is_not_found() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::at(dir.path());
        let err = workspace.load_facts("p1").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_save_and_load_facts() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::at(dir.path());
        let facts = FactSet {
            unresolved_includes: vec!["missing.h".to_string()],
            ..FactSet::default()
        };

        workspace.save_facts("p1", &facts).unwrap();
        assert!(workspace.facts_path("p1").ends_with("p1/analysis.json"));
        assert_eq!(workspace.load_facts("p1").unwrap(), facts);
    }

    #[test]
    fn test_snippets_default_to_empty() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::at(dir.path());
        assert!(workspace.load_snippets("p1").unwrap().is_empty());

        workspace.ensure_project_dir("p1").unwrap();
        fs::write(workspace.snippets_path("p1"), r#"{"cpp+function:///foo()": "void foo() {}"}"#).unwrap();
        let snippets = workspace.load_snippets("p1").unwrap();
        assert_eq!(snippets["cpp+function:///foo()"], "void foo() {}");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::at(dir.path());
        workspace.ensure_project_dir("p1").unwrap();
        workspace.remove("p1").unwrap();
        assert!(!workspace.project_dir("p1").exists());
        workspace.remove("p1").unwrap();
    }
}
