//! Shared application state for the web server.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use serde::Serialize;
use tracing::{debug, info, warn};

use dockyard_common::{Result, RunId, SessionId};
use dockyard_config::Config;
use dockyard_molecules::ligand::{LigandPreparer, OpenBabelPreparer};
use dockyard_molecules::pipeline::{DockingPipeline, DockingRequest, RunProgress, RunStage};

use crate::runs::{RunRegistry, RunStatus};
use crate::session::SessionStore;

/// Events pushed to connected clients via SSE.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// A run moved to a new stage
    RunStage { run_id: RunId, stage: RunStage, message: String },
    /// A run ended, successfully or not
    RunFinished { run_id: RunId, status: RunStatus },
}

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<DockingPipeline>,
    pub sessions: Arc<SessionStore>,
    pub runs: Arc<RunRegistry>,
    /// Broadcast channel for SSE push events
    pub event_tx: broadcast::Sender<AppEvent>,
    progress_tx: broadcast::Sender<RunProgress>,
}

impl AppState {
    /// State backed by the real tools named in `config`. Fails when the Vina
    /// binary is missing.
    pub async fn new(config: Config) -> Result<Self> {
        let obabel = OpenBabelPreparer::new(
            &config.tools.obabel_path,
            Duration::from_secs(config.limits.prep_timeout_secs),
        );
        if !obabel.is_available().await {
            warn!(
                "Open Babel not found at {:?}; every run will fail at ligand preparation",
                config.tools.obabel_path
            );
        }

        let pipeline = DockingPipeline::from_config(&config, Arc::new(obabel));
        pipeline.vina().ensure_available().await?;
        info!("AutoDock Vina found at {:?}", pipeline.vina().executable_path());

        Ok(Self::with_pipeline(config, pipeline))
    }

    /// State around an already built pipeline, without any startup checks.
    pub fn with_pipeline(config: Config, pipeline: DockingPipeline) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (progress_tx, progress_rx) = broadcast::channel(256);
        let runs = Arc::new(RunRegistry::new());

        tokio::spawn(forward_progress(progress_rx, runs.clone(), event_tx.clone()));

        Self {
            config,
            pipeline: Arc::new(pipeline),
            sessions: Arc::new(SessionStore::new()),
            runs,
            event_tx,
            progress_tx,
        }
    }

    pub fn with_preparer(config: Config, preparer: Arc<dyn LigandPreparer>) -> Self {
        let pipeline = DockingPipeline::from_config(&config, preparer);
        Self::with_pipeline(config, pipeline)
    }

    /// Periodically drop idle sessions and finished runs older than `max_age`.
    pub fn spawn_sweeper(&self, every: Duration, max_age: Duration) -> tokio::task::JoinHandle<()> {
        let sessions = self.sessions.clone();
        let runs = self.runs.clone();
        let run_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(12));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let evicted = sessions.evict_idle(max_age).await;
                let pruned = runs.prune_finished(run_age).await;
                if evicted > 0 || pruned > 0 {
                    info!("Swept {} idle sessions and {} finished runs", evicted, pruned);
                }
            }
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    /// Run the pipeline in a background task; the registry and SSE clients
    /// hear about the result.
    pub async fn spawn_run(&self, session: SessionId, request: DockingRequest) -> RunId {
        let (run_id, cancel) = self
            .runs
            .start(session, &request.smiles, request.search_box)
            .await;

        let pipeline = self.pipeline.clone();
        let runs = self.runs.clone();
        let event_tx = self.event_tx.clone();
        let progress_tx = self.progress_tx.clone();

        tokio::spawn(async move {
            let result = pipeline.run(run_id, request, &cancel, Some(progress_tx)).await;
            if let Err(ref e) = result {
                info!(run_id = %run_id, "Run ended without result: {}", e);
            }
            let status = runs.finish(run_id, result).await;
            let _ = event_tx.send(AppEvent::RunFinished { run_id, status });
        });

        run_id
    }
}

/// Copy pipeline progress into the registry and out to SSE clients.
async fn forward_progress(
    mut progress_rx: broadcast::Receiver<RunProgress>,
    runs: Arc<RunRegistry>,
    event_tx: broadcast::Sender<AppEvent>,
) {
    loop {
        match progress_rx.recv().await {
            Ok(progress) => {
                runs.set_stage(progress.run_id, progress.stage).await;
                let _ = event_tx.send(AppEvent::RunStage {
                    run_id: progress.run_id,
                    stage: progress.stage,
                    message: progress.message,
                });
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!("Progress forwarder lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub type SharedState = Arc<AppState>;
