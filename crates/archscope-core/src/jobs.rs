//! Background jobs: ingestion, annotation and deletion.
//!
//! `start_*` methods do the validation and the first status change on the
//! caller's task, then hand the long-running part to a tokio task. `run_*`
//! methods run that part inline. Failures are caught here and recorded as
//! project status `error`; a job whose project was deleted under it stops
//! without touching the project again.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::annotate::{AnnotationError, AnnotationReport, Annotator};
use crate::analysis::StaticAnalyzer;
use crate::config::AnnotationConfig;
use crate::facts::FactSet;
use crate::graph::GraphElements;
use crate::ingest::{IngestError, IngestOutcome, IngestService};
use crate::llm::LLM;
use crate::project::{truncate_message, Project, ProjectStatus};
use crate::store::{HierarchyStore, StoreError};

/// Errors surfaced by [`JobRunner`].
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Annotation is disabled: {0}")]
    AnnotationDisabled(String),

    #[error("No static analyzer configured")]
    NoAnalyzer,
}

impl JobError {
    pub fn is_not_found(&self) -> bool {
        match self {
            JobError::Ingest(e) => e.is_not_found(),
            JobError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_stale(&self) -> bool {
        match self {
            JobError::Ingest(e) => e.is_stale(),
            JobError::Annotation(e) => e.is_stale(),
            JobError::Store(e) => e.is_stale(),
            _ => false,
        }
    }

    /// The project was purged while the job ran.
    pub fn is_project_gone(&self) -> bool {
        match self {
            JobError::Ingest(e) => e.is_project_gone(),
            JobError::Annotation(e) => e.is_project_gone(),
            JobError::Store(e) => e.is_project_gone(),
            _ => false,
        }
    }
}

/// Where an ingestion job gets its input.
#[derive(Debug, Clone)]
pub enum IngestSource {
    Facts(FactSet),
    /// A previously exported graph document.
    Elements(GraphElements),
    /// The fact file saved by an earlier run.
    Resume,
    /// Run the static analyzer over a source directory first.
    Analyze(PathBuf),
}

impl IngestSource {
    fn failure_prefix(&self) -> &'static str {
        match self {
            IngestSource::Facts(_) | IngestSource::Elements(_) => "Ingestion failed",
            IngestSource::Resume => "Resume failed",
            IngestSource::Analyze(_) => "Analysis failed",
        }
    }
}

/// Runs project jobs against one store.
#[derive(Clone)]
pub struct JobRunner {
    ingest: IngestService,
    llm: Option<Arc<dyn LLM>>,
    analyzer: Option<Arc<dyn StaticAnalyzer>>,
    annotation: AnnotationConfig,
}

impl JobRunner {
    pub fn new(ingest: IngestService, annotation: AnnotationConfig) -> Self {
        Self {
            ingest,
            llm: None,
            analyzer: None,
            annotation,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LLM>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn StaticAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn ingest(&self) -> &IngestService {
        &self.ingest
    }

    pub fn store(&self) -> &Arc<dyn HierarchyStore> {
        self.ingest.store()
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Creates a project and ingests into it in the background.
    pub async fn start_ingest(&self, name: &str, source: IngestSource) -> Result<Project, JobError> {
        self.check_source(&source)?;
        let project = self.ingest.create_project(name).await?;
        self.spawn_ingest(project.clone(), source);
        Ok(project)
    }

    /// Creates a project and ingests into it, waiting for the result.
    pub async fn ingest_new(&self, name: &str, source: IngestSource) -> Result<(Project, IngestOutcome), JobError> {
        self.check_source(&source)?;
        let project = self.ingest.create_project(name).await?;
        let outcome = self.run_ingest(&project, source).await?;
        Ok((project, outcome))
    }

    /// Resumes ingestion of an `unresolved` project in the background.
    pub async fn start_resume(&self, project_id: &str) -> Result<Project, JobError> {
        let project = self.ingest.prepare_resume(project_id).await?;
        self.spawn_ingest(project.clone(), IngestSource::Resume);
        Ok(project)
    }

    pub fn spawn_ingest(&self, project: Project, source: IngestSource) {
        let runner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run_ingest(&project, source).await {
                debug!(project = %project.id, error = %e, "Background ingestion ended with an error");
            }
        });
    }

    /// Runs one ingestion job to completion, recording failures on the project.
    pub async fn run_ingest(&self, project: &Project, source: IngestSource) -> Result<IngestOutcome, JobError> {
        let prefix = source.failure_prefix();
        let result = match source {
            IngestSource::Facts(facts) => self.ingest.ingest_facts(project, facts).await,
            IngestSource::Elements(doc) => self.ingest.ingest_elements(project, doc).await,
            IngestSource::Resume => self.ingest.resume(project).await,
            IngestSource::Analyze(dir) => match &self.analyzer {
                Some(analyzer) => self.ingest.analyze(project, analyzer.as_ref(), &dir).await,
                None => return Err(self.fail(project, prefix, JobError::NoAnalyzer).await),
            },
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(project, prefix, e.into()).await),
        }
    }

    fn check_source(&self, source: &IngestSource) -> Result<(), JobError> {
        if matches!(source, IngestSource::Analyze(_)) && self.analyzer.is_none() {
            return Err(JobError::NoAnalyzer);
        }
        Ok(())
    }

    // =========================================================================
    // Annotation
    // =========================================================================

    /// Moves a `ready` project to `summarizing`. Fails when annotation is
    /// disabled or no collaborator is configured.
    pub async fn prepare_annotation(&self, project_id: &str) -> Result<Project, JobError> {
        if !self.annotation.enabled {
            return Err(JobError::AnnotationDisabled(
                "disabled in configuration".to_string(),
            ));
        }
        if self.llm.is_none() {
            return Err(JobError::AnnotationDisabled(
                "no LLM provider configured".to_string(),
            ));
        }

        let project = self.store().get_project(project_id).await?;
        Ok(self
            .store()
            .set_status(
                &project.id,
                project.generation,
                ProjectStatus::Summarizing,
                Some("Summarizing architecture with AI...".to_string()),
            )
            .await?)
    }

    /// Starts an annotation run in the background.
    pub async fn start_annotation(&self, project_id: &str) -> Result<Project, JobError> {
        let project = self.prepare_annotation(project_id).await?;
        let runner = self.clone();
        let captured = project.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run_annotation(&captured).await {
                debug!(project = %captured.id, error = %e, "Background summarization ended with an error");
            }
        });
        Ok(project)
    }

    /// Runs an annotation pass over a project already in `summarizing`.
    pub async fn run_annotation(&self, project: &Project) -> Result<AnnotationReport, JobError> {
        let Some(llm) = self.llm.clone() else {
            return Err(JobError::AnnotationDisabled(
                "no LLM provider configured".to_string(),
            ));
        };

        let snippets = match self.ingest.workspace().load_snippets(&project.id) {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!(project = %project.id, error = %e, "Ignoring unreadable snippet file");
                Default::default()
            }
        };

        let annotator = Annotator::new(llm, Arc::clone(self.store()))
            .with_system_prompt(self.annotation.system_prompt_or_default());

        let report = match annotator.run(&project.id, project.generation, snippets).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(project, "Summarization failed", e.into()).await),
        };

        let done = self
            .store()
            .set_status(
                &project.id,
                project.generation,
                ProjectStatus::Ready,
                Some(format!(
                    "AI summarization complete: {} nodes annotated, {} failed.",
                    report.summarized, report.failed
                )),
            )
            .await;
        if let Err(e) = done {
            return Err(self.fail(project, "Summarization failed", e.into()).await);
        }
        Ok(report)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Marks a project deleting and purges it in the background.
    pub async fn start_delete(&self, project_id: &str) -> Result<Project, JobError> {
        let project = self.store().mark_deleting(project_id).await?;
        let runner = self.clone();
        let id = project.id.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run_delete(&id).await {
                warn!(project = %id, error = %e, "Background delete failed");
            }
        });
        Ok(project)
    }

    /// Removes the project graph, record and workspace.
    pub async fn run_delete(&self, project_id: &str) -> Result<(), JobError> {
        self.store().mark_deleting(project_id).await?;
        self.store().purge_project(project_id).await?;
        if let Err(e) = self.ingest.workspace().remove(project_id) {
            warn!(project = project_id, error = %e, "Failed to delete workspace files");
        }
        info!(project = project_id, "Project deleted");
        Ok(())
    }

    /// Records a job failure on the project and hands the error back.
    async fn fail(&self, project: &Project, prefix: &str, error: JobError) -> JobError {
        if error.is_stale() {
            info!(project = %project.id, "Project was deleted while a job was running; stopping");
            return error;
        }
        if error.is_project_gone() {
            // The delete already removed the workspace; drop anything written since.
            if let Err(e) = self.ingest.workspace().remove(&project.id) {
                warn!(project = %project.id, error = %e, "Failed to delete workspace files");
            }
            info!(project = %project.id, "Project was purged while a job was running; stopping");
            return error;
        }

        let message = format!(
            "{prefix}: {}",
            truncate_message(&error.to_string(), self.annotation.error_context_length)
        );
        warn!(project = %project.id, error = %message, "Job failed");

        if let Err(e) = self
            .store()
            .set_status(&project.id, project.generation, ProjectStatus::Error, Some(message))
            .await
        {
            warn!(project = %project.id, error = %e, "Could not record job failure");
        }
        error
    }
}
