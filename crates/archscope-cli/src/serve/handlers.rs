//! HTTP route handlers.
//!
//! Handlers stay thin: queries go to the `QueryEngine`, anything
//! long-running goes to the `JobRunner` and returns once the job is queued.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use archscope_core::store::{EdgeFilter, NodeFilter};
use archscope_core::{GraphView, IngestError, JobError, Project, StoreError};

use super::models::{
    AggregatedEdges, ChildrenQuery, CreateProjectRequest, EdgeList, Message, NodeList,
    UnresolvedIncludes,
};
use super::AppState;

// =============================================================================
// Errors
// =============================================================================

/// Error response: `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::ProjectNotFound(_) | StoreError::NodeNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            StoreError::DuplicateProject(_) => AppError::BadRequest(err.to_string()),
            StoreError::InvalidTransition { .. } | StoreError::Stale { .. } => {
                AppError::Conflict(err.to_string())
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Store(e) => e.into(),
            e if e.is_not_found() => AppError::NotFound(e.to_string()),
            e => AppError::Internal(e.to_string()),
        }
    }
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Ingest(e) => e.into(),
            JobError::Store(e) => e.into(),
            e @ (JobError::AnnotationDisabled(_) | JobError::NoAnalyzer) => {
                AppError::BadRequest(e.to_string())
            }
            e => AppError::Internal(e.to_string()),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// =============================================================================
// Projects
// =============================================================================

/// GET `/api/projects` - All projects, newest first.
pub async fn list_projects(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Project>> {
    Ok(Json(state.jobs.store().list_projects().await?))
}

/// GET `/api/projects/{id}`
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Project> {
    Ok(Json(state.jobs.store().get_project(&id).await?))
}

/// POST `/api/projects` - Creates a project and queues its ingestion.
///
/// Returns the project in `processing` status; poll it to follow progress.
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let (name, source) = req.into_source().map_err(AppError::BadRequest)?;
    let project = state.jobs.start_ingest(&name, source).await?;
    Ok((StatusCode::ACCEPTED, Json(project)))
}

/// DELETE `/api/projects/{id}` - Marks the project deleting and purges it
/// in the background.
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Message> {
    state.jobs.start_delete(&id).await?;
    Ok(Json(Message::new("Project deleted successfully")))
}

// =============================================================================
// Graph views
// =============================================================================

/// GET `/api/projects/{id}/roots` - The top of the hierarchy.
pub async fn roots(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<GraphView> {
    Ok(Json(state.queries.roots(&id).await?))
}

/// GET `/api/projects/{id}/children?parent_id=` - One level below a node.
pub async fn children(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ChildrenQuery>,
) -> ApiResult<GraphView> {
    Ok(Json(state.queries.children(&id, &params.parent_id).await?))
}

/// GET `/api/projects/{id}/nodes` - Every stored node.
pub async fn nodes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<NodeList> {
    let nodes = state.jobs.store().scan_nodes(&id, &NodeFilter::all()).await?;
    Ok(Json(NodeList { nodes }))
}

/// GET `/api/projects/{id}/edges` - Every stored relation edge.
pub async fn edges(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<EdgeList> {
    let edges = state.jobs.store().scan_edges(&id, &EdgeFilter::all()).await?;
    Ok(Json(EdgeList { edges }))
}

/// POST `/api/projects/{id}/edges/aggregated`
///
/// Body is the list of currently visible node ids.
pub async fn aggregated_edges(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(visible_ids): Json<Vec<String>>,
) -> ApiResult<AggregatedEdges> {
    let edges = state.queries.aggregate_edges(&id, &visible_ids).await?;
    Ok(Json(AggregatedEdges { edges }))
}

// =============================================================================
// Jobs
// =============================================================================

/// GET `/api/projects/{id}/unresolved`
pub async fn unresolved(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<UnresolvedIncludes> {
    let unresolved = state.jobs.ingest().unresolved_includes(&id).await?;
    Ok(Json(UnresolvedIncludes { unresolved }))
}

/// POST `/api/projects/{id}/continue` - Resumes an `unresolved` ingestion.
pub async fn continue_ingestion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    state.jobs.start_resume(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(Message::new("Ingestion resumed"))))
}

/// POST `/api/projects/{id}/summarize` - Starts an annotation run.
pub async fn summarize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let project = state.jobs.start_annotation(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(project)))
}
