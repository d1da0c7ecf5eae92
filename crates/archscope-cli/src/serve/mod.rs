//! JSON API for the graph visualizer.
//!
//! The browser front end walks the hierarchy one level at a time
//! (`/roots`, `/children`) and asks for the relation edges lifted onto
//! whatever is currently expanded (`/edges/aggregated`). Ingestion,
//! summarization and deletion are queued as background jobs.
//!
//! # Module Structure
//!
//! - `handlers` - HTTP route handlers and error mapping
//! - `models` - API request/response envelopes

mod handlers;
mod models;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use archscope_core::{JobRunner, QueryEngine};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state for the server.
pub struct AppState {
    pub queries: QueryEngine,
    pub jobs: JobRunner,
}

impl AppState {
    pub fn new(jobs: JobRunner) -> Self {
        Self {
            queries: QueryEngine::new(Arc::clone(jobs.store())),
            jobs,
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

pub struct ServeConfig {
    pub host: String,
    pub port: u16,
}

// =============================================================================
// Server Entry Point
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route(
            "/projects/{id}",
            get(handlers::get_project).delete(handlers::delete_project),
        )
        .route("/projects/{id}/roots", get(handlers::roots))
        .route("/projects/{id}/children", get(handlers::children))
        .route("/projects/{id}/nodes", get(handlers::nodes))
        .route("/projects/{id}/edges", get(handlers::edges))
        .route(
            "/projects/{id}/edges/aggregated",
            post(handlers::aggregated_edges),
        )
        .route("/projects/{id}/unresolved", get(handlers::unresolved))
        .route("/projects/{id}/continue", post(handlers::continue_ingestion))
        .route("/projects/{id}/summarize", post(handlers::summarize));

    Router::new()
        .nest("/api", api)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the API server and serve until the process is stopped.
pub async fn start_server(config: ServeConfig, jobs: JobRunner) -> std::io::Result<()> {
    let state = Arc::new(AppState::new(jobs));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;

    info!(%addr, "API server listening");
    println!("ArchScope API: http://{addr}/api/projects");
    println!("Press Ctrl+C to stop\n");

    axum::serve(listener, app).await
}
