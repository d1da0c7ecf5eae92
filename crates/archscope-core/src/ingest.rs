//! Turning analyzer output into a stored project graph.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::analysis::{AnalysisError, StaticAnalyzer};
use crate::config::GraphConfig;
use crate::facts::{FactError, FactSet};
use crate::graph::{BuiltGraph, GraphBuilder, GraphElements, GraphError};
use crate::project::{Project, ProjectStatus};
use crate::store::{HierarchyStore, StoreError};
use crate::workspace::{Workspace, WorkspaceError};

/// Errors raised by [`IngestService`].
#[derive(Debug, Error)]
pub enum IngestError {
    /// A required input (usually the saved fact file) does not exist.
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Workspace(WorkspaceError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Facts(FactError),
}

impl IngestError {
    pub fn is_not_found(&self) -> bool {
        match self {
            IngestError::NotFound(_) => true,
            IngestError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, IngestError::Store(e) if e.is_stale())
    }

    pub fn is_project_gone(&self) -> bool {
        matches!(self, IngestError::Store(e) if e.is_project_gone())
    }
}

impl From<WorkspaceError> for IngestError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::NotFound(_) => IngestError::NotFound(err.to_string()),
            other => IngestError::Workspace(other),
        }
    }
}

/// How an ingestion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Imported { nodes: usize, edges: usize },
    /// Stopped before building: the analyzer reported unresolved includes.
    Unresolved { count: usize },
}

/// Ingestion pipeline: facts in, graph stored, status updated.
///
/// Every method expects a project captured at the start of the job; its
/// generation guards every write.
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn HierarchyStore>,
    workspace: Workspace,
    graph: GraphConfig,
}

impl IngestService {
    pub fn new(store: Arc<dyn HierarchyStore>, workspace: Workspace, graph: GraphConfig) -> Self {
        Self {
            store,
            workspace,
            graph,
        }
    }

    pub fn store(&self) -> &Arc<dyn HierarchyStore> {
        &self.store
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Registers a new project in `processing` status.
    pub async fn create_project(&self, name: &str) -> Result<Project, IngestError> {
        let project = self.store.create_project(name).await?;
        info!(project = %project.id, name = %project.name, "Created project");
        Ok(project)
    }

    /// Saves the fact set into the project workspace, then builds and stores
    /// the graph unless the analyzer reported unresolved includes.
    ///
    /// The project is checked before anything is written to its workspace.
    pub async fn ingest_facts(&self, project: &Project, facts: FactSet) -> Result<IngestOutcome, IngestError> {
        self.set_progress(project, "Saving analysis results...").await?;
        self.workspace.save_facts(&project.id, &facts)?;

        if facts.has_unresolved() {
            let count = facts.unresolved_includes.len();
            self.store
                .set_status(
                    &project.id,
                    project.generation,
                    ProjectStatus::Unresolved,
                    Some(format!("Action Needed: {count} unresolved includes found.")),
                )
                .await?;
            info!(project = %project.id, count, "Ingestion paused on unresolved includes");
            return Ok(IngestOutcome::Unresolved { count });
        }

        self.build_and_store(project, &facts).await
    }

    /// Imports a previously exported graph document as-is.
    pub async fn ingest_elements(
        &self,
        project: &Project,
        doc: GraphElements,
    ) -> Result<IngestOutcome, IngestError> {
        self.set_progress(project, "Importing JSON...").await?;
        let graph = BuiltGraph::from_elements(doc)?;
        self.store_graph(project, &graph).await
    }

    /// The unresolved includes recorded in the saved fact file.
    pub async fn unresolved_includes(&self, project_id: &str) -> Result<Vec<String>, IngestError> {
        self.store.get_project(project_id).await?;
        Ok(self.workspace.load_facts(project_id)?.unresolved_includes)
    }

    /// Moves an `unresolved` (or failed) project back to `processing`.
    /// Fails with [`IngestError::NotFound`] when no fact file was saved.
    pub async fn prepare_resume(&self, project_id: &str) -> Result<Project, IngestError> {
        let project = self.store.get_project(project_id).await?;
        let facts_path = self.workspace.facts_path(project_id);
        if !facts_path.exists() {
            return Err(WorkspaceError::NotFound(facts_path).into());
        }
        Ok(self
            .store
            .set_status(
                &project.id,
                project.generation,
                ProjectStatus::Processing,
                Some("Resuming ingestion...".to_string()),
            )
            .await?)
    }

    /// Builds the graph from the saved fact file, ignoring unresolved includes.
    pub async fn resume(&self, project: &Project) -> Result<IngestOutcome, IngestError> {
        let facts = self.workspace.load_facts(&project.id)?;
        self.build_and_store(project, &facts).await
    }

    /// Runs the analyzer over `source_dir`, then ingests its output.
    pub async fn analyze(
        &self,
        project: &Project,
        analyzer: &dyn StaticAnalyzer,
        source_dir: &Path,
    ) -> Result<IngestOutcome, IngestError> {
        self.set_progress(project, "Running static analysis...").await?;

        let output_dir = self.workspace.ensure_project_dir(&project.id)?;
        let facts_path = analyzer.analyze(source_dir, &output_dir).await?;
        let facts = FactSet::load(&facts_path).map_err(|e| match e {
            FactError::NotFound(_) => IngestError::NotFound(e.to_string()),
            other => IngestError::Facts(other),
        })?;

        self.ingest_facts(project, facts).await
    }

    async fn build_and_store(&self, project: &Project, facts: &FactSet) -> Result<IngestOutcome, IngestError> {
        self.set_progress(project, "Transforming facts into a graph...").await?;
        let graph = GraphBuilder::from_config(&project.name, &self.graph).build(facts);
        self.store_graph(project, &graph).await
    }

    async fn store_graph(&self, project: &Project, graph: &BuiltGraph) -> Result<IngestOutcome, IngestError> {
        self.store
            .replace_graph(&project.id, project.generation, graph)
            .await?;

        let (nodes, edges) = (graph.nodes.len(), graph.edges.len());
        self.store
            .set_status(
                &project.id,
                project.generation,
                ProjectStatus::Ready,
                Some(format!("Imported {nodes} nodes and {edges} edges successfully.")),
            )
            .await?;

        info!(project = %project.id, nodes, edges, "Ingestion finished");
        Ok(IngestOutcome::Imported { nodes, edges })
    }

    async fn set_progress(&self, project: &Project, message: &str) -> Result<(), IngestError> {
        self.store
            .set_status(
                &project.id,
                project.generation,
                ProjectStatus::Processing,
                Some(message.to_string()),
            )
            .await?;
        Ok(())
    }
}
