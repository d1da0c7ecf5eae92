use thiserror::Error;

use crate::project::ProjectStatus;

/// Errors raised by a [`HierarchyStore`](super::HierarchyStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("A project with the name '{0}' already exists.")]
    DuplicateProject(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ProjectStatus,
        to: ProjectStatus,
    },

    /// The project was deleted or restarted after the writer captured its generation.
    #[error("Stale write to project {project}: generation {expected} is no longer current")]
    Stale { project: String, expected: u64 },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_stale(&self) -> bool {
        matches!(self, StoreError::Stale { .. })
    }

    /// The project record no longer exists, so nothing may be written for it.
    pub fn is_project_gone(&self) -> bool {
        matches!(self, StoreError::ProjectNotFound(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ProjectNotFound(_) | StoreError::NodeNotFound(_)
        )
    }
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}
