//! Fact set to property graph.
//!
//! Construction runs in fixed order:
//! 1. physical pass - files and the folder chain above each of them
//! 2. logical pass - scopes, types, operations and variables, declared by files
//! 3. relation pass - containment, calls, inheritance, usage, type and include edges
//! 4. folder collapse - merges pass-through folders until none is left
//! 5. enrichment - `parent`, `ancestors` and `hasChildren` for every node

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{BuiltGraph, Edge, Node, PROP_FULL_PATH, PROP_SIMPLE_NAME};
use crate::config::{GraphConfig, ParentPreference};
use crate::facts::{normalize_path, parse_uri, FactSet};
use crate::ontology::{EdgeLabel, NodeRole};

/// Prefix of synthesized folder ids.
pub const FOLDER_ID_PREFIX: &str = "folder::";

/// Prefix of the materialized project root id.
pub const PROJECT_ID_PREFIX: &str = "project::";

/// Property key holding the analyzer scheme of logical nodes.
pub const PROP_SCHEME: &str = "scheme";

/// Builds a [`BuiltGraph`] from a [`FactSet`]. The builder itself is
/// stateless; every call to [`build`](Self::build) starts from scratch.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    project_name: String,
    materialize_root: bool,
    parent_preference: ParentPreference,
}

impl GraphBuilder {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            materialize_root: true,
            parent_preference: ParentPreference::Physical,
        }
    }

    pub fn from_config(project_name: impl Into<String>, config: &GraphConfig) -> Self {
        Self::new(project_name)
            .with_project_root(config.materialize_project_root)
            .with_parent_preference(config.parent_preference)
    }

    /// Emit a Project node above the first folder level.
    pub fn with_project_root(mut self, materialize: bool) -> Self {
        self.materialize_root = materialize;
        self
    }

    pub fn with_parent_preference(mut self, preference: ParentPreference) -> Self {
        self.parent_preference = preference;
        self
    }

    /// Id of the Project node, when one is materialized.
    pub fn project_root_id(&self) -> Option<String> {
        self.materialize_root
            .then(|| format!("{}{}", PROJECT_ID_PREFIX, self.project_name))
    }

    pub fn build(&self, facts: &FactSet) -> BuiltGraph {
        let mut state = self.collect(facts);
        let merged = state.collapse_single_child_folders();
        let graph = state.finalize(self.parent_preference);

        debug!(
            project = %self.project_name,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            collapsed_folders = merged,
            "Built graph"
        );

        graph
    }

    /// Runs the physical, logical and relation passes, leaving collapse and
    /// enrichment to the caller.
    pub fn collect(&self, facts: &FactSet) -> GraphState {
        let mut state = GraphState::default();

        let root = self.project_root_id();
        if let Some(root) = &root {
            state.add_node(root, NodeRole::Project, named(&self.project_name));
        }

        self.physical_pass(&mut state, facts, root.as_deref());
        self.logical_pass(&mut state, facts);
        self.relation_pass(&mut state, facts);

        state
    }

    fn physical_pass(&self, state: &mut GraphState, facts: &FactSet, root: Option<&str>) {
        let mut seen = HashSet::new();

        for (_, physical) in &facts.declarations {
            let parsed = parse_uri(physical);
            if !parsed.is_file() {
                continue;
            }

            let file_id = normalize_path(&parsed.path);
            if file_id.is_empty() || !seen.insert(file_id.clone()) {
                continue;
            }

            let mut properties = named(&parsed.simple_name);
            properties.insert(PROP_FULL_PATH.to_string(), Value::String(parsed.path.clone()));
            state.add_node(&file_id, NodeRole::File, properties);

            let segments: Vec<&str> = parsed.path.split('/').filter(|s| !s.is_empty()).collect();
            let folders = match segments.split_last() {
                Some((_, folders)) => folders,
                None => continue,
            };

            let mut parent = root.map(str::to_string);
            let mut accumulated = String::new();

            for segment in folders {
                accumulated.push('/');
                accumulated.push_str(segment);

                let folder_id = format!("{}{}", FOLDER_ID_PREFIX, normalize_path(&accumulated));
                let mut properties = named(segment);
                properties.insert(PROP_FULL_PATH.to_string(), Value::String(accumulated.clone()));
                state.add_node(&folder_id, NodeRole::Folder, properties);

                if let Some(parent_id) = &parent {
                    let label = if Some(parent_id.as_str()) == root {
                        EdgeLabel::Includes
                    } else {
                        EdgeLabel::Contains
                    };
                    state.add_edge(parent_id, &folder_id, label);
                }
                parent = Some(folder_id);
            }

            if let Some(parent_id) = &parent {
                state.add_edge(parent_id, &file_id, EdgeLabel::Contains);
            }
        }
    }

    fn logical_pass(&self, state: &mut GraphState, facts: &FactSet) {
        let mut unmapped = 0usize;

        for (logical, physical) in &facts.declarations {
            let parsed = parse_uri(logical);
            let Some(role) = NodeRole::from_scheme(&parsed.scheme) else {
                unmapped += 1;
                continue;
            };

            let mut properties = named(&parsed.simple_name);
            properties.insert(PROP_SCHEME.to_string(), Value::String(parsed.scheme));
            state.add_node(logical, role, properties);

            let file_id = normalize_path(&parse_uri(physical).path);
            state.add_edge(&file_id, logical, EdgeLabel::Declares);
        }

        if unmapped > 0 {
            debug!(unmapped, "Skipped declarations with unmapped schemes");
        }
    }

    fn relation_pass(&self, state: &mut GraphState, facts: &FactSet) {
        for (container, member) in &facts.containment {
            let label = match state.role_of(container) {
                Some(NodeRole::Scope) | Some(NodeRole::Operation) => EdgeLabel::Encloses,
                Some(NodeRole::Type) => EdgeLabel::Encapsulates,
                _ => continue,
            };
            state.add_edge(container, member, label);
        }

        for (caller, callee) in facts.invocations() {
            state.add_edge(caller, callee, EdgeLabel::Invokes);
        }

        for (sub, sup) in &facts.extends {
            state.add_edge(sub, sup, EdgeLabel::Specializes);
        }

        for (source, target) in &facts.uses {
            state.add_edge(source, target, EdgeLabel::Uses);
        }

        for (source, target) in &facts.type_dependency {
            let label = match state.role_of(source) {
                Some(NodeRole::Operation) => EdgeLabel::Returns,
                Some(NodeRole::Variable) => EdgeLabel::Typed,
                _ => continue,
            };
            state.add_edge(source, target, label);
        }

        for (from, to) in &facts.requires {
            let from_id = normalize_path(&parse_uri(from).path);
            let to_id = normalize_path(&parse_uri(to).path);
            state.add_edge(&from_id, &to_id, EdgeLabel::Requires);
        }
    }
}

fn named(simple_name: &str) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        PROP_SIMPLE_NAME.to_string(),
        Value::String(simple_name.to_string()),
    );
    properties
}

// =============================================================================
// Intermediate state
// =============================================================================

/// Node set and edge set between the construction passes and enrichment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphState {
    nodes: BTreeMap<String, StagedNode>,
    edges: BTreeSet<Edge>,
}

#[derive(Debug, Clone, PartialEq)]
struct StagedNode {
    role: NodeRole,
    properties: Map<String, Value>,
}

impl GraphState {
    /// Adds a node. A node with the same id is kept as it is.
    pub fn add_node(&mut self, id: &str, role: NodeRole, properties: Map<String, Value>) -> bool {
        if self.nodes.contains_key(id) {
            return false;
        }
        self.nodes
            .insert(id.to_string(), StagedNode { role, properties });
        true
    }

    /// Adds an edge when both endpoints exist. Duplicates collapse.
    pub fn add_edge(&mut self, source: &str, target: &str, label: EdgeLabel) -> bool {
        if !self.nodes.contains_key(source) || !self.nodes.contains_key(target) {
            return false;
        }
        self.edges.insert(Edge::new(source, target, label))
    }

    pub fn role_of(&self, id: &str) -> Option<NodeRole> {
        self.nodes.get(id).map(|n| n.role)
    }

    pub fn simple_name(&self, id: &str) -> Option<&str> {
        self.nodes
            .get(id)
            .and_then(|n| n.properties.get(PROP_SIMPLE_NAME))
            .and_then(Value::as_str)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Merges every folder whose only `contains`/`includes` child is another
    /// folder into that child, until no such folder remains. Returns the number
    /// of merges.
    ///
    /// Each sweep merges a set of disjoint (parent, child) pairs, so the result
    /// does not depend on the order in which candidates are visited.
    pub fn collapse_single_child_folders(&mut self) -> usize {
        let mut merged = 0;

        loop {
            let mut children: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
            for edge in &self.edges {
                if matches!(edge.label, EdgeLabel::Contains | EdgeLabel::Includes) {
                    children.entry(&edge.source).or_default().insert(&edge.target);
                }
            }

            let candidates: Vec<(String, String)> = children
                .iter()
                .filter(|(parent, _)| self.role_of(parent) == Some(NodeRole::Folder))
                .filter_map(|(parent, kids)| match kids.iter().next() {
                    Some(child) if kids.len() == 1 => Some((*parent, *child)),
                    _ => None,
                })
                .filter(|(_, child)| self.role_of(child) == Some(NodeRole::Folder))
                .map(|(parent, child)| (parent.to_string(), child.to_string()))
                .collect();

            if candidates.is_empty() {
                break;
            }

            let mut touched: HashSet<String> = HashSet::new();
            for (parent, child) in candidates {
                if touched.contains(&parent) || touched.contains(&child) {
                    continue;
                }
                self.merge_folder(&parent, &child);
                touched.insert(parent);
                touched.insert(child);
                merged += 1;
            }
        }

        merged
    }

    fn merge_folder(&mut self, parent: &str, child: &str) {
        let Some(child_node) = self.nodes.remove(child) else {
            return;
        };
        let child_name = child_node
            .properties
            .get(PROP_SIMPLE_NAME)
            .and_then(Value::as_str)
            .unwrap_or(child);

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            let parent_name = parent_node
                .properties
                .get(PROP_SIMPLE_NAME)
                .and_then(Value::as_str)
                .unwrap_or(parent);
            let merged_name = format!("{}/{}", parent_name, child_name);
            parent_node
                .properties
                .insert(PROP_SIMPLE_NAME.to_string(), Value::String(merged_name));
            if let Some(path) = child_node.properties.get(PROP_FULL_PATH) {
                parent_node
                    .properties
                    .insert(PROP_FULL_PATH.to_string(), path.clone());
            }
        }

        let touching: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| e.source == child || e.target == child)
            .cloned()
            .collect();

        for edge in touching {
            self.edges.remove(&edge);
            if edge.source == child && edge.target != parent {
                self.edges.insert(Edge::new(parent, edge.target, edge.label));
            }
        }
    }

    /// Resolves parents, materializes ancestor chains and drops hierarchy
    /// edges from the relation edge set.
    pub fn finalize(self, preference: ParentPreference) -> BuiltGraph {
        let GraphState { nodes, edges } = self;
        let is_variable =
            |id: &str| nodes.get(id).map(|n| n.role == NodeRole::Variable).unwrap_or(false);

        // Edges iterate sorted by source, so the first candidate per child is
        // the smallest parent id.
        let mut physical: BTreeMap<&str, &str> = BTreeMap::new();
        let mut logical: BTreeMap<&str, &str> = BTreeMap::new();
        for edge in &edges {
            if edge.source == edge.target || is_variable(&edge.target) {
                continue;
            }
            if edge.label.is_physical_parent() {
                physical.entry(&edge.target).or_insert(&edge.source);
            } else if edge.label.is_logical_parent() {
                logical.entry(&edge.target).or_insert(&edge.source);
            }
        }

        let (fallback, preferred) = match preference {
            ParentPreference::Physical => (logical, physical),
            ParentPreference::Logical => (physical, logical),
        };
        let mut parent_of: BTreeMap<String, String> = BTreeMap::new();
        for (child, parent) in fallback.into_iter().chain(preferred) {
            parent_of.insert(child.to_string(), parent.to_string());
        }
        break_parent_cycles(&mut parent_of);

        let parents: HashSet<&str> = parent_of.values().map(String::as_str).collect();

        let out_nodes: Vec<Node> = nodes
            .iter()
            .map(|(id, staged)| Node {
                id: id.clone(),
                labels: vec![staged.role],
                properties: staged.properties.clone(),
                parent: parent_of.get(id).cloned(),
                ancestors: ancestor_chain(id, &parent_of),
                has_children: staged.role != NodeRole::Operation && parents.contains(id.as_str()),
            })
            .collect();

        let out_edges: Vec<Edge> = edges
            .iter()
            .filter(|e| !e.label.is_structural())
            .filter(|e| !is_variable(&e.source) && !is_variable(&e.target))
            .cloned()
            .collect();

        BuiltGraph {
            nodes: out_nodes,
            edges: out_edges,
        }
    }
}

/// Malformed containment can close a loop in the parent map. Each loop is cut
/// at its smallest id, which becomes a root.
fn break_parent_cycles(parent_of: &mut BTreeMap<String, String>) {
    let mut settled: HashSet<String> = HashSet::new();
    let starts: Vec<String> = parent_of.keys().cloned().collect();

    for start in starts {
        let mut path: Vec<String> = Vec::new();
        let mut current = Some(start);

        while let Some(id) = current {
            if settled.contains(&id) {
                break;
            }
            if let Some(pos) = path.iter().position(|p| *p == id) {
                if let Some(cut) = path[pos..].iter().min().cloned() {
                    warn!(node = %cut, "Containment cycle detected; detaching node from its parent");
                    parent_of.remove(&cut);
                }
                break;
            }
            path.push(id.clone());
            current = parent_of.get(&id).cloned();
        }

        settled.extend(path);
    }
}

fn ancestor_chain(id: &str, parent_of: &BTreeMap<String, String>) -> Vec<String> {
    let mut chain = vec![id.to_string()];
    let mut current = id;
    while let Some(parent) = parent_of.get(current) {
        chain.push(parent.clone());
        current = parent;
    }
    chain
}
