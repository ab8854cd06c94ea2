//! Axum router: maps all URL paths to handlers.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::handlers::{
    dock::{dock_page, dock_submit},
    runs::{api_run, cancel_run, download_complex, download_ligand, run_page},
    system::health,
};
use crate::sse::sse_handler;
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.limits.max_upload_bytes;
    let shared: SharedState = Arc::new(state);

    Router::new()
        // Pages
        .route("/",                  get(dock_page))
        .route("/dock",              post(dock_submit))
        .route("/runs/{id}",         get(run_page))
        .route("/runs/{id}/cancel",  post(cancel_run))

        // Downloads
        .route("/runs/{id}/docked_ligand.pdbqt", get(download_ligand))
        .route("/runs/{id}/complex.pdbqt",       get(download_complex))

        // SSE streaming
        .route("/api/events", get(sse_handler))

        // API endpoints
        .route("/api/runs/{id}", get(api_run))
        .route("/health",        get(health))

        // Middleware
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
