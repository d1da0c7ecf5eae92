//! Annotation pass: a bottom-up, cycle-safe walk that asks the
//! text-generation collaborator to describe every reachable node.
//!
//! Each run owns an [`AnnotationRun`] arena with the project's nodes, the
//! traversal adjacency and a [`VisitState`] per node. Nothing is shared
//! between runs.
//!
//! Re-entering a node that is still [`VisitState::InProgress`] means the walk
//! closed a cycle. The node then gets a shallow annotation built only from
//! collaborators that were already summarized; the shallow result is cached
//! for the rest of the run and never persisted.

mod annotation;
mod prompts;

pub use annotation::{Annotation, ANALYSIS_FAILED, UNSUPPORTED_NODE_TYPE};
pub use prompts::{build_annotation_prompt, ChildSummaries, MISSING_SOURCE};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_ANNOTATION_SYSTEM_PROMPT;
use crate::graph::{Edge, Node};
use crate::llm::{LLMError, LLM};
use crate::ontology::{EdgeLabel, NodeRole};
use crate::store::{EdgeFilter, HierarchyStore, NodeFilter, StoreError};

/// Errors that stop an annotation run. Collaborator failures never do.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Node not found: {0}")]
    NodeNotFound(String),
}

impl AnnotationError {
    /// Whether the project was deleted or restarted under the run.
    pub fn is_stale(&self) -> bool {
        matches!(self, AnnotationError::Store(e) if e.is_stale())
    }

    pub fn is_project_gone(&self) -> bool {
        matches!(self, AnnotationError::Store(e) if e.is_project_gone())
    }
}

/// Per-node traversal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisitState {
    #[default]
    Unvisited,
    InProgress,
    Summarized,
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationReport {
    /// Nodes that received a final annotation from the collaborator.
    pub summarized: usize,
    /// Shallow annotations produced on cycle re-entry.
    pub shallow: usize,
    /// Nodes annotated with the failure placeholder.
    pub failed: usize,
    /// Nodes of roles without a prompt.
    pub skipped: usize,
}

// =============================================================================
// Run arena
// =============================================================================

/// State of one annotation run over one project.
pub struct AnnotationRun {
    project_id: String,
    generation: u64,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    /// Outgoing `(relation, target)` pairs the walk follows.
    targets: Vec<Vec<(EdgeLabel, usize)>>,
    states: Vec<VisitState>,
    annotations: Vec<Option<Annotation>>,
    shallow: HashMap<usize, Annotation>,
    snippets: HashMap<String, String>,
    report: AnnotationReport,
}

impl AnnotationRun {
    /// Builds the arena from a project's nodes and relation edges.
    ///
    /// A node's traversal targets are its hierarchy children, labeled with the
    /// structural relation their roles imply, plus the targets of its outgoing
    /// relation edges. Variables are never targets.
    pub fn new(
        project_id: impl Into<String>,
        generation: u64,
        nodes: Vec<Node>,
        edges: &[Edge],
    ) -> Self {
        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut adjacency: Vec<BTreeSet<(EdgeLabel, usize)>> = vec![BTreeSet::new(); nodes.len()];
        let walkable = |i: usize| !nodes[i].has_label(NodeRole::Variable);

        for (child, node) in nodes.iter().enumerate() {
            let Some(parent) = node.parent.as_ref().and_then(|p| index.get(p)).copied() else {
                continue;
            };
            if !walkable(child) {
                continue;
            }
            let label = match (nodes[parent].role(), node.role()) {
                (Some(p), Some(c)) => EdgeLabel::hierarchy_between(p, c),
                _ => EdgeLabel::Contains,
            };
            adjacency[parent].insert((label, child));
        }

        for edge in edges.iter().filter(|e| !e.label.is_structural()) {
            if let (Some(&source), Some(&target)) = (index.get(&edge.source), index.get(&edge.target)) {
                if walkable(target) {
                    adjacency[source].insert((edge.label, target));
                }
            }
        }

        let targets = adjacency
            .into_iter()
            .map(|set| set.into_iter().collect())
            .collect();
        let len = nodes.len();

        Self {
            project_id: project_id.into(),
            generation,
            nodes,
            index,
            targets,
            states: vec![VisitState::Unvisited; len],
            annotations: vec![None; len],
            shallow: HashMap::new(),
            snippets: HashMap::new(),
            report: AnnotationReport::default(),
        }
    }

    /// Loads every node and relation edge of a project from the store.
    pub async fn load(
        store: &dyn HierarchyStore,
        project_id: &str,
        generation: u64,
    ) -> Result<Self, StoreError> {
        let nodes = store.scan_nodes(project_id, &NodeFilter::all()).await?;
        let edges = store.scan_edges(project_id, &EdgeFilter::all()).await?;
        Ok(Self::new(project_id, generation, nodes, &edges))
    }

    /// Source text of operations, keyed by node id.
    pub fn with_snippets(mut self, snippets: HashMap<String, String>) -> Self {
        self.snippets = snippets;
        self
    }

    /// Ids of the nodes the walk starts from: every root except Variables.
    pub fn root_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.is_root() && !n.has_label(NodeRole::Variable))
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn state(&self, node_id: &str) -> VisitState {
        self.index
            .get(node_id)
            .map_or(VisitState::Unvisited, |&i| self.states[i])
    }

    /// Final annotation of a node, if the run reached it.
    pub fn annotation(&self, node_id: &str) -> Option<&Annotation> {
        self.index
            .get(node_id)
            .and_then(|&i| self.annotations[i].as_ref())
    }

    pub fn report(&self) -> AnnotationReport {
        self.report
    }

    fn citation(&self, target: usize, annotation: &Annotation) -> Option<String> {
        annotation.is_citable().then(|| {
            format!(
                "{}: {}",
                self.nodes[target].simple_name(),
                annotation.description
            )
        })
    }
}

/// One frame of the explicit traversal stack.
struct Frame {
    node: usize,
    /// Relation that reached this node from the frame below.
    via: Option<EdgeLabel>,
    next: usize,
    children: ChildSummaries,
}

impl Frame {
    fn new(node: usize, via: Option<EdgeLabel>) -> Self {
        Self {
            node,
            via,
            next: 0,
            children: ChildSummaries::new(),
        }
    }
}

// =============================================================================
// Annotator
// =============================================================================

/// Drives annotation runs against a store and a text-generation collaborator.
pub struct Annotator<L: LLM> {
    llm: L,
    store: Arc<dyn HierarchyStore>,
    system_prompt: String,
}

impl<L: LLM> Annotator<L> {
    pub fn new(llm: L, store: Arc<dyn HierarchyStore>) -> Self {
        Self {
            llm,
            store,
            system_prompt: DEFAULT_ANNOTATION_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Annotates every node reachable from the project's roots.
    pub async fn run(
        &self,
        project_id: &str,
        generation: u64,
        snippets: HashMap<String, String>,
    ) -> Result<AnnotationReport, AnnotationError> {
        let mut run = AnnotationRun::load(self.store.as_ref(), project_id, generation)
            .await?
            .with_snippets(snippets);

        let roots = run.root_ids();
        info!(
            project = project_id,
            nodes = run.nodes.len(),
            roots = roots.len(),
            "Starting annotation run"
        );

        for root in &roots {
            self.summarize(&mut run, root).await?;
        }

        let report = run.report();
        info!(
            project = project_id,
            summarized = report.summarized,
            shallow = report.shallow,
            failed = report.failed,
            skipped = report.skipped,
            "Annotation run finished"
        );
        Ok(report)
    }

    /// Annotates `node_id` and everything it reaches that is still unvisited.
    ///
    /// Returns the node's final annotation, or its shallow one when called
    /// while the node is itself in progress.
    pub async fn summarize(
        &self,
        run: &mut AnnotationRun,
        node_id: &str,
    ) -> Result<Annotation, AnnotationError> {
        let start = *run
            .index
            .get(node_id)
            .ok_or_else(|| AnnotationError::NodeNotFound(node_id.to_string()))?;

        match run.states[start] {
            VisitState::Summarized => {
                if let Some(annotation) = &run.annotations[start] {
                    return Ok(annotation.clone());
                }
            }
            VisitState::InProgress => return Ok(self.shallow(run, start).await),
            VisitState::Unvisited => {}
        }

        run.states[start] = VisitState::InProgress;
        let mut stack = vec![Frame::new(start, None)];
        let mut last = None;

        while let Some(frame) = stack.last_mut() {
            let next = run.targets[frame.node].get(frame.next).copied();
            if let Some((label, target)) = next {
                frame.next += 1;
                match run.states[target] {
                    VisitState::Summarized => {
                        let cited = run.annotations[target]
                            .as_ref()
                            .and_then(|a| run.citation(target, a));
                        if let Some(line) = cited {
                            frame.children.entry(label).or_default().push(line);
                        }
                    }
                    VisitState::InProgress => {
                        let annotation = self.shallow(run, target).await;
                        if let Some(line) = run.citation(target, &annotation) {
                            if let Some(frame) = stack.last_mut() {
                                frame.children.entry(label).or_default().push(line);
                            }
                        }
                    }
                    VisitState::Unvisited => {
                        run.states[target] = VisitState::InProgress;
                        stack.push(Frame::new(target, Some(label)));
                    }
                }
                continue;
            }

            let Some(done) = stack.pop() else { break };
            let annotation = self.annotate_node(run, done.node, &done.children).await;

            self.store
                .set_annotation(
                    &run.project_id,
                    run.generation,
                    &run.nodes[done.node].id,
                    &annotation,
                )
                .await?;
            run.states[done.node] = VisitState::Summarized;
            run.shallow.remove(&done.node);

            if let (Some(parent), Some(label)) = (stack.last_mut(), done.via) {
                if let Some(line) = run.citation(done.node, &annotation) {
                    parent.children.entry(label).or_default().push(line);
                }
            }
            run.annotations[done.node] = Some(annotation.clone());
            last = Some(annotation);
        }

        last.ok_or_else(|| AnnotationError::NodeNotFound(node_id.to_string()))
    }

    /// Annotation of a node re-entered through a cycle, computed from the
    /// collaborators that are already summarized.
    async fn shallow(&self, run: &mut AnnotationRun, node: usize) -> Annotation {
        if let Some(cached) = run.shallow.get(&node) {
            return cached.clone();
        }

        let mut children = ChildSummaries::new();
        for &(label, target) in &run.targets[node] {
            if run.states[target] != VisitState::Summarized {
                continue;
            }
            if let Some(line) = run.annotations[target]
                .as_ref()
                .and_then(|a| run.citation(target, a))
            {
                children.entry(label).or_default().push(line);
            }
        }

        debug!(
            node = %run.nodes[node].id,
            cited = children.values().map(Vec::len).sum::<usize>(),
            "Cycle re-entry, building shallow annotation"
        );

        let annotation = self.generate(run, node, &children).await;
        run.report.shallow += 1;
        run.shallow.insert(node, annotation.clone());
        annotation
    }

    /// Final annotation of a node; updates the run counters.
    async fn annotate_node(
        &self,
        run: &mut AnnotationRun,
        node: usize,
        children: &ChildSummaries,
    ) -> Annotation {
        let annotation = self.generate(run, node, children).await;
        if annotation.is_failed() {
            run.report.failed += 1;
        } else if annotation.is_citable() {
            run.report.summarized += 1;
        } else {
            run.report.skipped += 1;
        }
        annotation
    }

    async fn generate(&self, run: &AnnotationRun, node: usize, children: &ChildSummaries) -> Annotation {
        let node = &run.nodes[node];
        let Some(role) = node.role() else {
            return Annotation::unsupported();
        };
        let snippet = run.snippets.get(&node.id).map(String::as_str);
        let Some(prompt) = build_annotation_prompt(role, node.simple_name(), children, snippet) else {
            return Annotation::unsupported();
        };

        match self.complete(&prompt).await {
            Ok(annotation) => annotation,
            Err(e) => {
                warn!(node = %node.id, role = %role, error = %e, "Annotation failed");
                Annotation::failed(e)
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<Annotation, LLMError> {
        let response = self
            .llm
            .complete_with_system(&self.system_prompt, prompt)
            .await?;
        parse_annotation(&response)
    }
}

/// Parses a collaborator response into an annotation.
///
/// Accepts bare JSON or JSON in a markdown code block, and unwraps an
/// `arguments` object when the model echoes a tool-call envelope.
pub fn parse_annotation(response: &str) -> Result<Annotation, LLMError> {
    let json = extract_json(response);
    let mut object: Map<String, Value> = serde_json::from_str(json).map_err(|e| {
        LLMError::ParseError(format!(
            "Failed to parse annotation as JSON: {}. Response: {}",
            e,
            crate::project::truncate_message(json, 200)
        ))
    })?;

    if let Some(Value::Object(inner)) = object.remove("arguments") {
        object = inner;
    }

    let description = match object.remove("description") {
        Some(Value::String(d)) if !d.trim().is_empty() => d,
        _ => {
            return Err(LLMError::ParseError(
                "Annotation has no description".to_string(),
            ))
        }
    };

    Ok(Annotation {
        description,
        details: object,
    })
}

/// Extracts JSON from a response that might be wrapped in markdown code blocks.
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let rest = &trimmed[start + 1..];
            if let Some(end) = rest.rfind("```") {
                return rest[..end].trim();
            }
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let annotation =
            parse_annotation(r#"{"description": "Loads config", "howItWorks": "Reads TOML"}"#).unwrap();
        assert_eq!(annotation.description, "Loads config");
        assert_eq!(annotation.details["howItWorks"], "Reads TOML");
    }

    #[test]
    fn test_parse_fenced_json() {
        let annotation = parse_annotation("```json\n{\"description\": \"A folder\"}\n```").unwrap();
        assert_eq!(annotation.description, "A folder");
    }

    #[test]
    fn test_parse_tool_envelope() {
        let annotation =
            parse_annotation(r#"{"arguments": {"description": "A type", "responsibilities": []}}"#)
                .unwrap();
        assert_eq!(annotation.description, "A type");
        assert!(annotation.details.contains_key("responsibilities"));
    }

    #[test]
    fn test_parse_rejects_missing_description() {
        assert!(parse_annotation(r#"{"keywords": []}"#).is_err());
        assert!(parse_annotation("not json").is_err());
    }
}
