//! Static-analysis fact sets and location normalization.
//!
//! The external analyzer emits one JSON document per project. Every relation
//! is a list of `[from, to]` location pairs; `declarations` pairs a logical
//! location with the physical location that declares it.

mod uri;

pub use uri::{normalize_path, parse_uri, ParsedUri, FILE_SCHEME, UNKNOWN_SCHEME};

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// A `[from, to]` location pair.
pub type FactPair = (String, String);

/// Errors raised while reading a fact file.
#[derive(Debug, Error)]
pub enum FactError {
    #[error("Fact file not found: {0}")]
    NotFound(String),

    #[error("IO error reading facts: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed fact file: {0}")]
    Json(#[from] serde_json::Error),
}

/// The analyzer output for one project. Missing arrays default to empty.
///
/// Entries that are not a pair of strings are dropped while reading; the rest
/// of the document still loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FactSet {
    /// `[logicalUri, physicalUri]`
    #[serde(deserialize_with = "lenient_pairs")]
    pub declarations: Vec<FactPair>,
    /// `[container, member]`
    #[serde(deserialize_with = "lenient_pairs")]
    pub containment: Vec<FactPair>,
    #[serde(deserialize_with = "lenient_pairs")]
    pub method_invocations: Vec<FactPair>,
    #[serde(deserialize_with = "lenient_pairs")]
    pub call_graph: Vec<FactPair>,
    /// `[subtype, supertype]`
    #[serde(deserialize_with = "lenient_pairs")]
    pub extends: Vec<FactPair>,
    #[serde(deserialize_with = "lenient_pairs")]
    pub uses: Vec<FactPair>,
    #[serde(deserialize_with = "lenient_pairs")]
    pub type_dependency: Vec<FactPair>,
    /// `[includingFile, includedFile]`
    #[serde(deserialize_with = "lenient_pairs")]
    pub requires: Vec<FactPair>,
    #[serde(deserialize_with = "lenient_strings")]
    pub unresolved_includes: Vec<String>,
}

fn lenient_pairs<'de, D>(deserializer: D) -> Result<Vec<FactPair>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    let total = raw.len();
    let pairs: Vec<FactPair> = raw
        .into_iter()
        .filter_map(|entry| match entry {
            Value::Array(items) => match items.as_slice() {
                [Value::String(from), Value::String(to)] => Some((from.clone(), to.clone())),
                _ => None,
            },
            _ => None,
        })
        .collect();

    if pairs.len() < total {
        debug!(dropped = total - pairs.len(), "Dropped malformed fact entries");
    }
    Ok(pairs)
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    let total = raw.len();
    let strings: Vec<String> = raw
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect();

    if strings.len() < total {
        debug!(dropped = total - strings.len(), "Dropped malformed unresolved includes");
    }
    Ok(strings)
}

impl FactSet {
    pub fn from_json(json: &str) -> Result<Self, FactError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a fact file, reporting a missing file as [`FactError::NotFound`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FactError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FactError::NotFound(path.display().to_string())
            } else {
                FactError::Io(e)
            }
        })?;
        Self::from_json(&content)
    }

    pub fn has_unresolved(&self) -> bool {
        !self.unresolved_includes.is_empty()
    }

    /// Both call lists; the analyzer reports member calls and free calls separately.
    pub fn invocations(&self) -> impl Iterator<Item = &FactPair> {
        self.method_invocations.iter().chain(self.call_graph.iter())
    }

    /// Total number of facts, for logging.
    pub fn len(&self) -> usize {
        self.declarations.len()
            + self.containment.len()
            + self.method_invocations.len()
            + self.call_graph.len()
            + self.extends.len()
            + self.uses.len()
            + self.type_dependency.len()
            + self.requires.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_camel_case() {
        let facts = FactSet::from_json(
            r#"{
                "declarations": [["cpp+function:///foo()", "file:///src/a.cpp"]],
                "methodInvocations": [["cpp+function:///foo()", "cpp+function:///bar()"]],
                "callGraph": [["cpp+function:///bar()", "cpp+function:///foo()"]],
                "typeDependency": [],
                "unresolvedIncludes": ["<boost/asio.hpp>"]
            }"#,
        )
        .unwrap();

        assert_eq!(facts.declarations.len(), 1);
        assert_eq!(facts.invocations().count(), 2);
        assert!(facts.has_unresolved());
        assert!(facts.extends.is_empty());
    }

    #[test]
    fn test_empty_document() {
        let facts = FactSet::from_json("{}").unwrap();
        assert!(facts.is_empty());
        assert!(!facts.has_unresolved());
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let facts = FactSet::from_json(
            r#"{
                "declarations": [["cpp+function:///foo()", "file:///src/a.cpp"]],
                "uses": [["only-one"], ["a", "b", "c"], [1, "x"], "flat",
                         ["cpp+function:///foo()", "cpp+variable:///g"]],
                "requires": null,
                "unresolvedIncludes": ["<vector>", 7]
            }"#,
        )
        .unwrap();

        assert_eq!(facts.declarations.len(), 1);
        assert_eq!(
            facts.uses,
            vec![("cpp+function:///foo()".to_string(), "cpp+variable:///g".to_string())]
        );
        assert!(facts.requires.is_empty());
        assert_eq!(facts.unresolved_includes, vec!["<vector>".to_string()]);
    }

    #[test]
    fn test_non_array_relation_is_an_error() {
        let result = FactSet::from_json(r#"{"uses": 5}"#);
        assert!(matches!(result, Err(FactError::Json(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FactSet::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(FactError::NotFound(_))));
    }
}
