//! The hierarchical labeled property graph.
//!
//! # Components
//!
//! - [`GraphBuilder`] - turns a [`FactSet`](crate::facts::FactSet) into nodes and edges
//! - [`Node`] / [`Edge`] - the persisted shape, with hierarchy precomputed
//! - [`GraphElements`] - the `{elements: {nodes, edges}}` interchange document

mod builder;

pub use builder::{GraphBuilder, GraphState};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ontology::{EdgeLabel, NodeRole};

/// Property key every node carries.
pub const PROP_SIMPLE_NAME: &str = "simpleName";

/// Property key of the annotation written by the annotation pass.
pub const PROP_AI_SUMMARY: &str = "ai_summary";

/// Property key of the original (display) path of files and folders.
pub const PROP_FULL_PATH: &str = "fullPath";

/// Errors raised when importing a prebuilt graph document.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Malformed graph document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Node {node} is missing the simpleName property")]
    MissingSimpleName { node: String },

    #[error("Node {node} has an ancestor chain that does not start with itself")]
    BadAncestors { node: String },

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),
}

// =============================================================================
// Node / Edge
// =============================================================================

/// A graph node with its hierarchy position materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub labels: Vec<NodeRole>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Resolved parent id; absent for roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Self-inclusive, node-to-root.
    #[serde(default)]
    pub ancestors: Vec<String>,
    #[serde(default)]
    pub has_children: bool,
}

impl Node {
    /// The primary role. Nodes always carry exactly one in practice.
    pub fn role(&self) -> Option<NodeRole> {
        self.labels.first().copied()
    }

    pub fn has_label(&self, role: NodeRole) -> bool {
        self.labels.contains(&role)
    }

    pub fn simple_name(&self) -> &str {
        self.properties
            .get(PROP_SIMPLE_NAME)
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A relation edge. Edges compare by `(source, target, label)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub label: EdgeLabel,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, label: EdgeLabel) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label,
        }
    }
}

// =============================================================================
// Built graph
// =============================================================================

/// Builder output: every node plus the exported relation edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl BuiltGraph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn to_elements(&self) -> GraphElements {
        GraphElements {
            elements: Elements {
                nodes: self
                    .nodes
                    .iter()
                    .cloned()
                    .map(|data| Element { data })
                    .collect(),
                edges: self
                    .edges
                    .iter()
                    .cloned()
                    .map(|data| Element { data })
                    .collect(),
            },
        }
    }

    /// Imports a previously exported graph.
    ///
    /// Structural edges and edges with a missing endpoint are dropped, the
    /// same way the builder drops them. Node hierarchy fields are trusted.
    pub fn from_elements(doc: GraphElements) -> Result<Self, GraphError> {
        let mut ids = BTreeSet::new();
        let mut nodes = Vec::with_capacity(doc.elements.nodes.len());

        for Element { data: mut node } in doc.elements.nodes {
            if !node.properties.contains_key(PROP_SIMPLE_NAME) {
                return Err(GraphError::MissingSimpleName { node: node.id });
            }
            if node.ancestors.is_empty() {
                node.ancestors.push(node.id.clone());
            }
            if node.ancestors[0] != node.id {
                return Err(GraphError::BadAncestors { node: node.id });
            }
            if !ids.insert(node.id.clone()) {
                return Err(GraphError::DuplicateNode(node.id));
            }
            nodes.push(node);
        }

        let edges: BTreeSet<Edge> = doc
            .elements
            .edges
            .into_iter()
            .map(|e| e.data)
            .filter(|e| !e.label.is_structural())
            .filter(|e| ids.contains(&e.source) && ids.contains(&e.target))
            .collect();

        Ok(Self {
            nodes,
            edges: edges.into_iter().collect(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Self::from_elements(serde_json::from_str(json)?)
    }
}

// =============================================================================
// Interchange document
// =============================================================================

/// `{"elements": {"nodes": [{"data": ...}], "edges": [{"data": ...}]}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphElements {
    pub elements: Elements,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Elements {
    #[serde(default)]
    pub nodes: Vec<Element<Node>>,
    #[serde(default)]
    pub edges: Vec<Element<Edge>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element<T> {
    pub data: T,
}
