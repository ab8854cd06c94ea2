//! In-memory registry of docking runs and their cancel handles.

use chrono::{DateTime, Utc};
use dockyard_common::{DockyardError, Result, RunId, SessionId};
use dockyard_molecules::cancel::{cancel_pair, CancelHandle, CancelToken};
use dockyard_molecules::pipeline::{DockingOutcome, RunStage};
use dockyard_molecules::search_box::SearchBox;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Why a run did not succeed, in the words shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub message: String,
    /// Vina's raw stdout when it exited nonzero.
    pub stdout: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: RunId,
    #[serde(skip)]
    pub session: SessionId,
    pub smiles: String,
    pub search_box: SearchBox,
    pub status: RunStatus,
    pub stage: Option<RunStage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<Arc<DockingOutcome>>,
    pub failure: Option<RunFailure>,
}

#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<RunId, RunRecord>>,
    cancel_handles: Mutex<HashMap<RunId, CancelHandle>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new running run and hand back the token the pipeline watches.
    pub async fn start(&self, session: SessionId, smiles: &str, search_box: SearchBox) -> (RunId, CancelToken) {
        let id = RunId::new();
        let (handle, token) = cancel_pair();
        let record = RunRecord {
            id,
            session,
            smiles: smiles.to_string(),
            search_box,
            status: RunStatus::Running,
            stage: None,
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            failure: None,
        };
        self.runs.write().await.insert(id, record);
        self.cancel_handles.lock().await.insert(id, handle);
        (id, token)
    }

    pub async fn set_stage(&self, id: RunId, stage: RunStage) {
        if let Some(record) = self.runs.write().await.get_mut(&id) {
            if record.status == RunStatus::Running {
                record.stage = Some(stage);
            }
        }
    }

    /// Record the pipeline's result. Returns the final status.
    pub async fn finish(&self, id: RunId, result: Result<DockingOutcome>) -> RunStatus {
        self.cancel_handles.lock().await.remove(&id);

        let (status, outcome, failure) = match result {
            Ok(outcome) => (RunStatus::Succeeded, Some(Arc::new(outcome)), None),
            Err(e) => {
                let status = match e {
                    DockyardError::Cancelled => RunStatus::Cancelled,
                    DockyardError::DockingTimedOut(_) => RunStatus::TimedOut,
                    _ => RunStatus::Failed,
                };
                (status, None, Some(failure_from(e)))
            }
        };

        let mut runs = self.runs.write().await;
        if let Some(record) = runs.get_mut(&id) {
            record.status = status;
            record.stage = None;
            record.finished_at = Some(Utc::now());
            record.outcome = outcome;
            record.failure = failure;
        }
        status
    }

    /// Ask a running run to stop. `Ok(false)` when it already finished.
    pub async fn cancel(&self, id: RunId) -> Result<bool> {
        if !self.runs.read().await.contains_key(&id) {
            return Err(DockyardError::RunNotFound(id.to_string()));
        }
        match self.cancel_handles.lock().await.get(&id) {
            Some(handle) => {
                info!(run_id = %id, "Cancel requested");
                handle.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn get(&self, id: RunId) -> Option<RunRecord> {
        self.runs.read().await.get(&id).cloned()
    }

    /// Forget finished runs older than `max_age`.
    pub async fn prune_finished(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, r| r.finished_at.map_or(true, |t| t > cutoff));
        before - runs.len()
    }
}

fn failure_from(e: DockyardError) -> RunFailure {
    match e {
        DockyardError::DockingFailed { stdout, .. } => RunFailure {
            message: "Docking failed. Check the search box coordinates.".to_string(),
            stdout: Some(stdout),
        },
        e if e.is_ligand_error() => RunFailure {
            message: format!("SMILES error: {}", e),
            stdout: None,
        },
        e => RunFailure { message: e.to_string(), stdout: None },
    }
}
