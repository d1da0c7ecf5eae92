//! Ingestion and background job tests.
//!
//! Covers the project status flow end to end: processing -> ready,
//! processing -> unresolved -> processing -> ready, failures recorded as
//! `error`, annotation runs and deletion racing with running jobs.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use archscope_core::analysis::CommandAnalyzer;
use archscope_core::config::{AnnotationConfig, GraphConfig};
use archscope_core::graph::PROP_AI_SUMMARY;
use archscope_core::llm::LLM;
use archscope_core::store::NodeFilter;
use archscope_core::{
    FactSet, GraphBuilder, HierarchyStore, IngestOutcome, IngestService, IngestSource, JobError,
    JobRunner, MemoryStore, ProjectStatus, Workspace,
};

use common::{demo_facts, ScriptedLLM, ENGINE, MAIN};

struct Harness {
    dir: TempDir,
    store: Arc<MemoryStore>,
    runner: JobRunner,
}

fn harness() -> Harness {
    harness_with(AnnotationConfig::default())
}

fn harness_with(annotation: AnnotationConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ingest = IngestService::new(
        store.clone(),
        Workspace::at(dir.path().join("projects")),
        GraphConfig::default(),
    );
    Harness {
        dir,
        store,
        runner: JobRunner::new(ingest, annotation),
    }
}

fn with_unresolved(mut facts: FactSet) -> FactSet {
    facts.unresolved_includes = vec!["boost/asio.hpp".to_string(), "missing.h".to_string()];
    facts
}

// =============================================================================
// Ingestion
// =============================================================================

#[tokio::test]
async fn test_ingest_facts_reaches_ready() {
    let h = harness();

    let (project, outcome) = h
        .runner
        .ingest_new("demo", IngestSource::Facts(demo_facts()))
        .await
        .unwrap();

    let IngestOutcome::Imported { nodes, edges } = outcome else {
        panic!("expected an import, got {outcome:?}");
    };
    let stored = h.store.scan_nodes(&project.id, &NodeFilter::all()).await.unwrap();
    assert_eq!(stored.len(), nodes);
    assert!(edges > 0);

    let project = h.store.get_project(&project.id).await.unwrap();
    assert_eq!(project.status, ProjectStatus::Ready);
    assert_eq!(
        project.description.as_deref(),
        Some(format!("Imported {nodes} nodes and {edges} edges successfully.").as_str())
    );

    // The fact file is kept for later resumes.
    assert!(h.runner.ingest().workspace().facts_path(&project.id).exists());
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let h = harness();
    h.runner
        .ingest_new("demo", IngestSource::Facts(demo_facts()))
        .await
        .unwrap();

    let err = h
        .runner
        .ingest_new("demo", IngestSource::Facts(demo_facts()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("demo"));
    assert_eq!(h.store.list_projects().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unresolved_then_resume() {
    let h = harness();

    let (project, outcome) = h
        .runner
        .ingest_new("demo", IngestSource::Facts(with_unresolved(demo_facts())))
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Unresolved { count: 2 });

    let paused = h.store.get_project(&project.id).await.unwrap();
    assert_eq!(paused.status, ProjectStatus::Unresolved);
    assert_eq!(
        paused.description.as_deref(),
        Some("Action Needed: 2 unresolved includes found.")
    );
    assert!(h
        .store
        .scan_nodes(&project.id, &NodeFilter::all())
        .await
        .unwrap()
        .is_empty());

    let includes = h.runner.ingest().unresolved_includes(&project.id).await.unwrap();
    assert_eq!(includes, vec!["boost/asio.hpp", "missing.h"]);

    let resumed = h.runner.ingest().prepare_resume(&project.id).await.unwrap();
    assert_eq!(resumed.status, ProjectStatus::Processing);
    assert_eq!(resumed.description.as_deref(), Some("Resuming ingestion..."));

    let outcome = h.runner.run_ingest(&resumed, IngestSource::Resume).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Imported { .. }));

    let done = h.store.get_project(&project.id).await.unwrap();
    assert_eq!(done.status, ProjectStatus::Ready);
    let main = h
        .store
        .scan_nodes(&project.id, &NodeFilter::all().ids([MAIN]))
        .await
        .unwrap();
    assert_eq!(main.len(), 1);
}

#[tokio::test]
async fn test_resume_without_facts_is_not_found() {
    let h = harness();
    let project = h.runner.ingest().create_project("empty").await.unwrap();

    let err = h.runner.ingest().prepare_resume(&project.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_failed_job_records_error_status() {
    let h = harness();
    let project = h.runner.ingest().create_project("broken").await.unwrap();

    // Nothing was ever saved for this project, so the resume job fails.
    let err = h
        .runner
        .run_ingest(&project, IngestSource::Resume)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let failed = h.store.get_project(&project.id).await.unwrap();
    assert_eq!(failed.status, ProjectStatus::Error);
    let description = failed.description.unwrap();
    assert!(description.starts_with("Resume failed: "), "{description}");
}

#[tokio::test]
async fn test_import_elements() {
    let h = harness();
    let exported = GraphBuilder::from_config("demo", &GraphConfig::default())
        .build(&demo_facts())
        .to_elements();

    let (project, outcome) = h
        .runner
        .ingest_new("imported", IngestSource::Elements(exported.clone()))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        IngestOutcome::Imported {
            nodes: exported.elements.nodes.len(),
            edges: exported.elements.edges.len(),
        }
    );
    let engine = h
        .store
        .scan_nodes(&project.id, &NodeFilter::all().ids([ENGINE]))
        .await
        .unwrap();
    assert_eq!(engine.len(), 1);
}

#[tokio::test]
async fn test_analyze_without_analyzer_creates_nothing() {
    let h = harness();
    let err = h
        .runner
        .ingest_new("demo", IngestSource::Analyze("/src".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::NoAnalyzer));
    assert!(h.store.list_projects().await.unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_analyze_runs_command() {
    let h = harness();
    let fixture = h.dir.path().join("fixture.json");
    std::fs::write(&fixture, serde_json::to_string(&demo_facts()).unwrap()).unwrap();

    let script = format!("cp '{}' {{output}}/analysis.json", fixture.display());
    let analyzer = CommandAnalyzer::new(
        vec!["sh".to_string(), "-c".to_string(), script],
        "analysis.json",
    );
    let runner = h.runner.clone().with_analyzer(Arc::new(analyzer));

    let source = h.dir.path().join("src");
    std::fs::create_dir_all(&source).unwrap();
    let (project, outcome) = runner
        .ingest_new("analyzed", IngestSource::Analyze(source))
        .await
        .unwrap();

    assert!(matches!(outcome, IngestOutcome::Imported { .. }));
    assert_eq!(
        h.store.get_project(&project.id).await.unwrap().status,
        ProjectStatus::Ready
    );
}

// =============================================================================
// Annotation
// =============================================================================

#[tokio::test]
async fn test_annotation_job() {
    let h = harness();
    let llm = Arc::new(ScriptedLLM::new());
    let runner = h.runner.clone().with_llm(llm.clone() as Arc<dyn LLM>);

    let (project, outcome) = runner
        .ingest_new("demo", IngestSource::Facts(demo_facts()))
        .await
        .unwrap();
    let IngestOutcome::Imported { nodes, .. } = outcome else {
        panic!("expected an import");
    };

    let summarizing = runner.prepare_annotation(&project.id).await.unwrap();
    assert_eq!(summarizing.status, ProjectStatus::Summarizing);

    let report = runner.run_annotation(&summarizing).await.unwrap();
    assert_eq!(report.summarized, nodes);
    assert_eq!(report.failed, 0);

    let done = h.store.get_project(&project.id).await.unwrap();
    assert_eq!(done.status, ProjectStatus::Ready);
    assert_eq!(
        done.description.as_deref(),
        Some(format!("AI summarization complete: {nodes} nodes annotated, 0 failed.").as_str())
    );

    let engine = h
        .store
        .scan_nodes(&project.id, &NodeFilter::all().ids([ENGINE]))
        .await
        .unwrap();
    assert!(engine[0].properties.contains_key(PROP_AI_SUMMARY));
}

#[tokio::test]
async fn test_annotation_requires_ready_project() {
    let h = harness();
    let runner = h
        .runner
        .clone()
        .with_llm(Arc::new(ScriptedLLM::new()) as Arc<dyn LLM>);

    let (project, _) = runner
        .ingest_new("demo", IngestSource::Facts(with_unresolved(demo_facts())))
        .await
        .unwrap();

    let err = runner.prepare_annotation(&project.id).await.unwrap_err();
    assert!(matches!(err, JobError::Store(_)), "{err}");
    assert_eq!(
        h.store.get_project(&project.id).await.unwrap().status,
        ProjectStatus::Unresolved
    );
}

#[tokio::test]
async fn test_annotation_disabled() {
    let h = harness_with(AnnotationConfig {
        enabled: false,
        ..AnnotationConfig::default()
    });
    let runner = h
        .runner
        .clone()
        .with_llm(Arc::new(ScriptedLLM::new()) as Arc<dyn LLM>);
    let (project, _) = runner
        .ingest_new("demo", IngestSource::Facts(demo_facts()))
        .await
        .unwrap();

    let err = runner.prepare_annotation(&project.id).await.unwrap_err();
    assert!(matches!(err, JobError::AnnotationDisabled(_)));
}

#[tokio::test]
async fn test_annotation_without_llm() {
    let h = harness();
    let (project, _) = h
        .runner
        .ingest_new("demo", IngestSource::Facts(demo_facts()))
        .await
        .unwrap();

    let err = h.runner.prepare_annotation(&project.id).await.unwrap_err();
    assert!(matches!(err, JobError::AnnotationDisabled(_)));
    assert_eq!(
        h.store.get_project(&project.id).await.unwrap().status,
        ProjectStatus::Ready
    );
}

// =============================================================================
// Deletion
// =============================================================================

#[tokio::test]
async fn test_delete_purges_project_and_workspace() {
    let h = harness();
    let (project, _) = h
        .runner
        .ingest_new("demo", IngestSource::Facts(demo_facts()))
        .await
        .unwrap();
    let dir = h.runner.ingest().workspace().project_dir(&project.id);
    assert!(dir.exists());

    h.runner.run_delete(&project.id).await.unwrap();

    assert!(h.store.get_project(&project.id).await.unwrap_err().is_not_found());
    assert!(!dir.exists());

    // The name is free again.
    h.runner
        .ingest_new("demo", IngestSource::Facts(demo_facts()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_job_stops_quietly_after_delete() {
    let h = harness();
    let project = h.runner.ingest().create_project("demo").await.unwrap();

    // The job captured `project` before the delete request arrived.
    h.store.mark_deleting(&project.id).await.unwrap();

    let err = h
        .runner
        .run_ingest(&project, IngestSource::Facts(demo_facts()))
        .await
        .unwrap_err();
    assert!(err.is_stale());

    let current = h.store.get_project(&project.id).await.unwrap();
    assert_eq!(current.status, ProjectStatus::Deleting);
    assert_eq!(current.description.as_deref(), Some("Deleting project..."));
    assert!(h
        .store
        .scan_nodes(&project.id, &NodeFilter::all())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_job_after_purge_leaves_no_workspace() {
    let h = harness();
    let project = h.runner.ingest().create_project("demo").await.unwrap();

    // The delete finishes before the already-queued job gets to run.
    h.runner.run_delete(&project.id).await.unwrap();

    let err = h
        .runner
        .run_ingest(&project, IngestSource::Facts(demo_facts()))
        .await
        .unwrap_err();
    assert!(err.is_project_gone());

    assert!(!h.runner.ingest().workspace().project_dir(&project.id).exists());
    assert!(h.store.get_project(&project.id).await.unwrap_err().is_not_found());
    assert!(h.store.list_projects().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_project_delete_is_not_found() {
    let h = harness();
    let err = h.runner.run_delete("missing").await.unwrap_err();
    assert!(err.is_not_found());
}
