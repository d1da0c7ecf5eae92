//! In-process hierarchy store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{apply_status, check_generation, EdgeFilter, HierarchyStore, NodeFilter, ParentFilter, StoreError};
use crate::annotate::Annotation;
use crate::graph::{BuiltGraph, Edge, Node, PROP_AI_SUMMARY};
use crate::project::{Project, ProjectStatus};

/// Immutable snapshot of one project's graph with lookup indexes.
#[derive(Debug, Default)]
struct ProjectGraph {
    nodes: BTreeMap<String, Node>,
    roots: Vec<String>,
    children: HashMap<String, Vec<String>>,
    /// Ancestor id -> every node whose chain contains it (itself included).
    members: HashMap<String, Vec<String>>,
    edges: Vec<Edge>,
}

impl ProjectGraph {
    fn index(graph: &BuiltGraph) -> Self {
        let mut indexed = ProjectGraph::default();

        for node in &graph.nodes {
            match &node.parent {
                Some(parent) => indexed
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .push(node.id.clone()),
                None => indexed.roots.push(node.id.clone()),
            }
            for ancestor in &node.ancestors {
                indexed
                    .members
                    .entry(ancestor.clone())
                    .or_default()
                    .push(node.id.clone());
            }
            indexed.nodes.insert(node.id.clone(), node.clone());
        }

        let mut edges = graph.edges.clone();
        edges.sort();
        edges.dedup();
        indexed.edges = edges;
        indexed
    }

    /// Narrows the scan to an index lookup where the filter allows it.
    fn candidates(&self, filter: &NodeFilter) -> Vec<&Node> {
        let ids: Option<BTreeSet<&String>> = match (&filter.parent, &filter.ancestor_in, &filter.ids) {
            (ParentFilter::Of(parent), _, _) => {
                Some(self.children.get(parent).into_iter().flatten().collect())
            }
            (ParentFilter::Root, _, _) => Some(self.roots.iter().collect()),
            (_, Some(visible), _) => Some(
                visible
                    .iter()
                    .filter_map(|id| self.members.get(id))
                    .flatten()
                    .collect(),
            ),
            (_, _, Some(ids)) => Some(ids.iter().collect()),
            _ => None,
        };

        match ids {
            Some(ids) => ids.into_iter().filter_map(|id| self.nodes.get(id)).collect(),
            None => self.nodes.values().collect(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    projects: HashMap<String, Project>,
    graphs: HashMap<String, Arc<ProjectGraph>>,
    annotations: HashMap<String, HashMap<String, Annotation>>,
}

impl MemoryState {
    fn project(&self, id: &str) -> Result<&Project, StoreError> {
        self.projects
            .get(id)
            .ok_or_else(|| StoreError::ProjectNotFound(id.to_string()))
    }

    fn project_mut(&mut self, id: &str) -> Result<&mut Project, StoreError> {
        self.projects
            .get_mut(id)
            .ok_or_else(|| StoreError::ProjectNotFound(id.to_string()))
    }
}

/// Hierarchy store kept entirely in memory.
///
/// Used by tests and by `archscope serve --memory`. Graph snapshots are
/// indexed outside the lock and swapped in whole, so readers never observe a
/// partially replaced graph.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn graph(&self, project_id: &str) -> Result<Arc<ProjectGraph>, StoreError> {
        let state = self.state.read().await;
        state.project(project_id)?;
        Ok(state.graphs.get(project_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl HierarchyStore for MemoryStore {
    async fn create_project(&self, name: &str) -> Result<Project, StoreError> {
        let mut state = self.state.write().await;
        let taken = state
            .projects
            .values()
            .any(|p| p.name == name && p.status != ProjectStatus::Deleting);
        if taken {
            return Err(StoreError::DuplicateProject(name.to_string()));
        }

        let project = Project::new(name);
        state.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        self.state.read().await.project(id).cloned()
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state
            .projects
            .values()
            .filter(|p| p.status != ProjectStatus::Deleting)
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(projects)
    }

    async fn set_status(
        &self,
        id: &str,
        generation: u64,
        status: ProjectStatus,
        description: Option<String>,
    ) -> Result<Project, StoreError> {
        let mut state = self.state.write().await;
        let project = state.project_mut(id)?;
        apply_status(project, generation, status, description)?;
        Ok(project.clone())
    }

    async fn mark_deleting(&self, id: &str) -> Result<Project, StoreError> {
        let mut state = self.state.write().await;
        let project = state.project_mut(id)?;
        if project.status != ProjectStatus::Deleting {
            project.status = ProjectStatus::Deleting;
            project.description = Some("Deleting project...".to_string());
            project.generation += 1;
        }
        Ok(project.clone())
    }

    async fn purge_project(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.projects.remove(id);
        state.graphs.remove(id);
        state.annotations.remove(id);
        Ok(())
    }

    async fn replace_graph(
        &self,
        id: &str,
        generation: u64,
        graph: &BuiltGraph,
    ) -> Result<(), StoreError> {
        let indexed = Arc::new(ProjectGraph::index(graph));

        let mut state = self.state.write().await;
        check_generation(state.project(id)?, generation)?;
        state.graphs.insert(id.to_string(), indexed);
        state.annotations.remove(id);
        Ok(())
    }

    async fn scan_nodes(
        &self,
        project_id: &str,
        filter: &NodeFilter,
    ) -> Result<Vec<Node>, StoreError> {
        let state = self.state.read().await;
        state.project(project_id)?;
        let Some(graph) = state.graphs.get(project_id) else {
            return Ok(Vec::new());
        };
        let annotations = state.annotations.get(project_id);

        // Only matched nodes pick up their annotation.
        let mut nodes: Vec<Node> = graph
            .candidates(filter)
            .into_iter()
            .filter(|node| filter.matches(node))
            .map(|node| {
                let mut node = node.clone();
                if let Some(annotation) = annotations.and_then(|a| a.get(&node.id)) {
                    node.properties
                        .insert(PROP_AI_SUMMARY.to_string(), annotation.to_value());
                }
                node
            })
            .collect();
        drop(state);
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn scan_edges(
        &self,
        project_id: &str,
        filter: &EdgeFilter,
    ) -> Result<Vec<Edge>, StoreError> {
        let graph = self.graph(project_id).await?;
        Ok(graph
            .edges
            .iter()
            .filter(|edge| filter.matches(edge))
            .cloned()
            .collect())
    }

    async fn set_annotation(
        &self,
        project_id: &str,
        generation: u64,
        node_id: &str,
        annotation: &Annotation,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        check_generation(state.project(project_id)?, generation)?;

        let exists = state
            .graphs
            .get(project_id)
            .is_some_and(|g| g.nodes.contains_key(node_id));
        if !exists {
            return Err(StoreError::NodeNotFound(node_id.to_string()));
        }

        state
            .annotations
            .entry(project_id.to_string())
            .or_default()
            .insert(node_id.to_string(), annotation.clone());
        Ok(())
    }
}
