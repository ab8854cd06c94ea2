//! Liveness endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub vina_path: String,
    pub active_sessions: usize,
}

pub async fn health(State(state): State<SharedState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        vina_path: state.pipeline.vina().executable_path().display().to_string(),
        active_sessions: state.sessions.len().await,
    })
}
