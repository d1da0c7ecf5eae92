use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Description stored on nodes whose collaborator call failed.
pub const ANALYSIS_FAILED: &str = "(Analysis failed)";

/// Description stored on roles the annotation pass has no prompt for.
pub const UNSUPPORTED_NODE_TYPE: &str = "(Skipped - Unsupported Node Type)";

/// The `ai_summary` object attached to a node.
///
/// `description` is always present; the remaining fields depend on the node
/// role (e.g. `howItWorks` for operations, `keywords` for scopes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub description: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Annotation {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            details: Map::new(),
        }
    }

    /// Fallback annotation for a node whose collaborator call failed.
    pub fn failed(error: impl fmt::Display) -> Self {
        let mut annotation = Self::new(ANALYSIS_FAILED);
        annotation
            .details
            .insert("error".to_string(), Value::String(error.to_string()));
        annotation
    }

    pub fn unsupported() -> Self {
        Self::new(UNSUPPORTED_NODE_TYPE)
    }

    pub fn is_failed(&self) -> bool {
        self.description == ANALYSIS_FAILED
    }

    /// Whether children may cite this annotation in their own prompts.
    pub fn is_citable(&self) -> bool {
        !self.is_failed() && self.description != UNSUPPORTED_NODE_TYPE
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_details_flatten() {
        let annotation = Annotation::new("Parses config").with_detail("howItWorks", "Reads TOML");
        assert_eq!(
            annotation.to_value(),
            json!({"description": "Parses config", "howItWorks": "Reads TOML"})
        );

        let back: Annotation =
            serde_json::from_value(json!({"description": "d", "keywords": ["io"]})).unwrap();
        assert_eq!(back.details["keywords"], json!(["io"]));
    }

    #[test]
    fn test_failed_annotation() {
        let annotation = Annotation::failed("timeout");
        assert!(annotation.is_failed());
        assert!(!annotation.is_citable());
        assert_eq!(annotation.details["error"], "timeout");
    }
}
