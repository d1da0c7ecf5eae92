use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a project.
///
/// ```text
/// processing -> ready | error | unresolved
/// unresolved -> processing | error
/// ready      -> processing | decomposing | summarizing
/// decomposing, summarizing -> ready | error
/// error      -> processing
/// any        -> deleting (terminal)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Processing,
    Ready,
    Error,
    /// The analyzer found includes it could not resolve. Ingestion can be resumed.
    Unresolved,
    Decomposing,
    Summarizing,
    Deleting,
}

impl ProjectStatus {
    /// Whether a project in this status may move to `next`.
    ///
    /// Re-entering the current status is allowed so long-running jobs can
    /// update the progress description.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;

        if *self == Deleting {
            return false;
        }
        if next == Deleting || next == *self {
            return true;
        }
        matches!(
            (self, next),
            (Processing, Ready | Error | Unresolved)
                | (Unresolved, Processing | Error)
                | (Ready, Processing | Decomposing | Summarizing)
                | (Decomposing | Summarizing, Ready | Error)
                | (Error, Processing)
        )
    }

    /// Whether a background job is expected to be running.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Processing | ProjectStatus::Decomposing | ProjectStatus::Summarizing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Processing => "processing",
            ProjectStatus::Ready => "ready",
            ProjectStatus::Error => "error",
            ProjectStatus::Unresolved => "unresolved",
            ProjectStatus::Decomposing => "decomposing",
            ProjectStatus::Summarizing => "summarizing",
            ProjectStatus::Deleting => "deleting",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project: one ingested codebase and its graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    /// Human-readable progress or error message.
    pub description: Option<String>,
    /// Bumped when the project is marked for deletion. Jobs carry the value
    /// they started with; writes with an older value are rejected.
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            status: ProjectStatus::Processing,
            description: Some("Processing started...".to_string()),
            generation: 0,
            created_at: Utc::now(),
        }
    }
}

/// Truncates a message to at most `max` characters on a char boundary.
pub fn truncate_message(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProjectStatus::*;

    #[test]
    fn test_new_project_is_processing() {
        let project = Project::new("engine");
        assert_eq!(project.status, Processing);
        assert_eq!(project.generation, 0);
        assert!(!project.id.is_empty());
    }

    #[test]
    fn test_documented_transitions() {
        assert!(Processing.can_transition_to(Ready));
        assert!(Processing.can_transition_to(Error));
        assert!(Processing.can_transition_to(Unresolved));
        assert!(Unresolved.can_transition_to(Processing));
        assert!(Ready.can_transition_to(Summarizing));
        assert!(Summarizing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Decomposing));
        assert!(Decomposing.can_transition_to(Ready));
        assert!(Error.can_transition_to(Processing));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!Processing.can_transition_to(Summarizing));
        assert!(!Unresolved.can_transition_to(Ready));
        assert!(!Error.can_transition_to(Ready));
        assert!(!Summarizing.can_transition_to(Decomposing));
    }

    #[test]
    fn test_deleting_is_terminal() {
        for status in [Processing, Ready, Error, Unresolved, Decomposing, Summarizing] {
            assert!(status.can_transition_to(Deleting));
            assert!(!Deleting.can_transition_to(status));
        }
        assert!(!Deleting.can_transition_to(Deleting));
    }

    #[test]
    fn test_same_status_updates() {
        assert!(Processing.can_transition_to(Processing));
        assert!(Summarizing.can_transition_to(Summarizing));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Unresolved).unwrap(), "\"unresolved\"");
        assert_eq!(Summarizing.to_string(), "summarizing");
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("abcdef", 3), "abc");
        assert_eq!(truncate_message("ab", 3), "ab");
        assert_eq!(truncate_message("ééé", 2), "éé");
    }
}
