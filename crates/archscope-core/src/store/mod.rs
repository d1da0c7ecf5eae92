//! Hierarchy store: durable keeper of projects, nodes and relation edges.
//!
//! # Components
//!
//! - [`HierarchyStore`] - the interface the query and annotation engines read through
//! - [`MemoryStore`] - in-process store with an inverted ancestor index
//! - [`SurrealStore`] - embedded SurrealDB store (RocksDB on disk, in-memory for tests)
//!
//! # Consistency
//!
//! - [`HierarchyStore::replace_graph`] is atomic: readers see the previous
//!   graph or the new one, never a mix.
//! - Every write made on behalf of a background job carries the project
//!   generation the job started with. Marking a project for deletion bumps the
//!   generation, so late writes from an in-flight job fail with
//!   [`StoreError::Stale`] instead of resurrecting data.

mod error;
mod memory;
mod surreal;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use surreal::SurrealStore;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::annotate::Annotation;
use crate::graph::{BuiltGraph, Edge, Node};
use crate::ontology::NodeRole;
use crate::project::{Project, ProjectStatus};

/// Which part of the tree a node scan covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParentFilter {
    #[default]
    Any,
    /// Nodes without a parent.
    Root,
    /// Direct children of the given node.
    Of(String),
}

/// Predicate for [`HierarchyStore::scan_nodes`]. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub parent: ParentFilter,
    pub with_role: Option<NodeRole>,
    pub without_role: Option<NodeRole>,
    /// Restrict to these ids.
    pub ids: Option<BTreeSet<String>>,
    /// Nodes whose ancestor chain (self included) contains any of these ids.
    pub ancestor_in: Option<BTreeSet<String>>,
}

impl NodeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn roots() -> Self {
        Self {
            parent: ParentFilter::Root,
            ..Self::default()
        }
    }

    pub fn children_of(parent: impl Into<String>) -> Self {
        Self {
            parent: ParentFilter::Of(parent.into()),
            ..Self::default()
        }
    }

    pub fn with_ancestor_in<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ancestor_in: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn role(mut self, role: NodeRole) -> Self {
        self.with_role = Some(role);
        self
    }

    pub fn excluding(mut self, role: NodeRole) -> Self {
        self.without_role = Some(role);
        self
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Evaluates the predicate against a node.
    pub fn matches(&self, node: &Node) -> bool {
        let parent_ok = match &self.parent {
            ParentFilter::Any => true,
            ParentFilter::Root => node.parent.is_none(),
            ParentFilter::Of(p) => node.parent.as_deref() == Some(p.as_str()),
        };
        parent_ok
            && self.with_role.map_or(true, |r| node.has_label(r))
            && self.without_role.map_or(true, |r| !node.has_label(r))
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&node.id))
            && self
                .ancestor_in
                .as_ref()
                .map_or(true, |set| node.ancestors.iter().any(|a| set.contains(a)))
    }
}

/// Predicate for [`HierarchyStore::scan_edges`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeFilter {
    /// Only edges with both endpoints in this set.
    pub within: Option<BTreeSet<String>>,
}

impl EdgeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn within<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            within: Some(ids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn matches(&self, edge: &Edge) -> bool {
        self.within
            .as_ref()
            .map_or(true, |ids| ids.contains(&edge.source) && ids.contains(&edge.target))
    }
}

/// Storage backend for projects and their graphs.
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    /// Creates a project in `processing` status. Names are unique among
    /// projects that are not being deleted.
    async fn create_project(&self, name: &str) -> Result<Project, StoreError>;

    async fn get_project(&self, id: &str) -> Result<Project, StoreError>;

    /// All projects not marked for deletion, newest first.
    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;

    /// Moves a project to `status`, validating the transition and the
    /// writer's generation.
    async fn set_status(
        &self,
        id: &str,
        generation: u64,
        status: ProjectStatus,
        description: Option<String>,
    ) -> Result<Project, StoreError>;

    /// Marks a project `deleting` and bumps its generation. Idempotent.
    async fn mark_deleting(&self, id: &str) -> Result<Project, StoreError>;

    /// Removes a project with its nodes, edges and annotations.
    async fn purge_project(&self, id: &str) -> Result<(), StoreError>;

    /// Atomically replaces every node and edge of a project. Clears annotations.
    async fn replace_graph(
        &self,
        id: &str,
        generation: u64,
        graph: &BuiltGraph,
    ) -> Result<(), StoreError>;

    /// Nodes matching `filter`, with any stored annotation merged into
    /// `properties.ai_summary`. Sorted by id.
    async fn scan_nodes(&self, project_id: &str, filter: &NodeFilter)
        -> Result<Vec<Node>, StoreError>;

    /// Relation edges matching `filter`, sorted.
    async fn scan_edges(&self, project_id: &str, filter: &EdgeFilter)
        -> Result<Vec<Edge>, StoreError>;

    /// Stores the annotation of one node.
    async fn set_annotation(
        &self,
        project_id: &str,
        generation: u64,
        node_id: &str,
        annotation: &Annotation,
    ) -> Result<(), StoreError>;
}

/// Rejects writes from jobs whose generation is out of date.
pub(crate) fn check_generation(project: &Project, generation: u64) -> Result<(), StoreError> {
    if project.status == ProjectStatus::Deleting || project.generation != generation {
        return Err(StoreError::Stale {
            project: project.id.clone(),
            expected: generation,
        });
    }
    Ok(())
}

/// Applies a validated status change to `project`.
pub(crate) fn apply_status(
    project: &mut Project,
    generation: u64,
    status: ProjectStatus,
    description: Option<String>,
) -> Result<(), StoreError> {
    check_generation(project, generation)?;
    if !project.status.can_transition_to(status) {
        return Err(StoreError::InvalidTransition {
            from: project.status,
            to: status,
        });
    }
    project.status = status;
    project.description = description;
    Ok(())
}
