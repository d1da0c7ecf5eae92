//! API request and response bodies.
//!
//! Graph and project payloads are the core types serialized as-is; only the
//! envelopes the visualizer expects live here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use archscope_core::{AggregatedEdge, Edge, FactSet, GraphElements, IngestSource, Node};

// =============================================================================
// Projects
// =============================================================================

/// Body of `POST /api/projects`.
///
/// Exactly one input is expected: an uploaded JSON `document` (a fact set or
/// an exported graph) or a `source_dir` to run the static analyzer over.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub document: Option<Value>,
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
}

impl CreateProjectRequest {
    /// Picks the ingestion source, telling fact sets and graph exports apart
    /// by their top-level keys.
    pub fn into_source(self) -> Result<(String, IngestSource), String> {
        let source = match (self.document, self.source_dir) {
            (Some(doc), None) => document_source(doc)?,
            (None, Some(dir)) => IngestSource::Analyze(dir),
            (Some(_), Some(_)) => {
                return Err("Provide either a document or a source_dir, not both.".to_string())
            }
            (None, None) => return Err("Provide a document or a source_dir.".to_string()),
        };
        Ok((self.name, source))
    }
}

fn document_source(doc: Value) -> Result<IngestSource, String> {
    if doc.get("declarations").is_some() {
        let facts: FactSet = serde_json::from_value(doc)
            .map_err(|e| format!("Failed to parse fact file: {e}"))?;
        Ok(IngestSource::Facts(facts))
    } else if doc.get("elements").is_some() {
        let graph: GraphElements = serde_json::from_value(doc)
            .map_err(|e| format!("Failed to parse graph file: {e}"))?;
        Ok(IngestSource::Elements(graph))
    } else {
        Err("Unknown JSON format.".to_string())
    }
}

// =============================================================================
// Graph views
// =============================================================================

/// Query parameters for `/children`.
#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    pub parent_id: String,
}

/// Full node and edge listing for `/nodes` and `/edges` consumers.
#[derive(Debug, Serialize)]
pub struct NodeList {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Serialize)]
pub struct EdgeList {
    pub edges: Vec<Edge>,
}

/// Response of `/edges/aggregated`.
#[derive(Debug, Serialize)]
pub struct AggregatedEdges {
    pub edges: Vec<AggregatedEdge>,
}

// =============================================================================
// Jobs
// =============================================================================

#[derive(Debug, Serialize)]
pub struct UnresolvedIncludes {
    pub unresolved: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> CreateProjectRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_fact_document_detected() {
        let (name, source) = request(json!({
            "name": "demo",
            "document": { "declarations": [], "requires": [] }
        }))
        .into_source()
        .unwrap();
        assert_eq!(name, "demo");
        assert!(matches!(source, IngestSource::Facts(_)));
    }

    #[test]
    fn test_graph_document_detected() {
        let (_, source) = request(json!({
            "name": "demo",
            "document": { "elements": { "nodes": [], "edges": [] } }
        }))
        .into_source()
        .unwrap();
        assert!(matches!(source, IngestSource::Elements(_)));
    }

    #[test]
    fn test_source_dir() {
        let (_, source) = request(json!({ "name": "demo", "source_dir": "/src" }))
            .into_source()
            .unwrap();
        assert!(matches!(source, IngestSource::Analyze(dir) if dir == PathBuf::from("/src")));
    }

    #[test]
    fn test_unknown_document_rejected() {
        let err = request(json!({ "name": "demo", "document": { "foo": 1 } }))
            .into_source()
            .unwrap_err();
        assert_eq!(err, "Unknown JSON format.");
    }

    #[test]
    fn test_missing_input_rejected() {
        assert!(request(json!({ "name": "demo" })).into_source().is_err());
        assert!(request(json!({
            "name": "demo",
            "document": { "declarations": [] },
            "source_dir": "/src"
        }))
        .into_source()
        .is_err());
    }
}
