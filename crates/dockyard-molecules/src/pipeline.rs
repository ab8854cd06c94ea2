//! Orchestrator for one docking run.
//!
//! Stages, strictly in order:
//!   1. Validate the search box
//!   2. Sanitize the receptor into the run's working directory
//!   3. Prepare the ligand from SMILES
//!   4. Wait for a docking slot, then run AutoDock Vina
//!   5. Extract the affinity table and the top pose
//!
//! Any error ends the run; nothing is retried. The working directory is
//! removed afterwards unless the pipeline is told to keep it.

use chrono::{DateTime, Utc};
use dockyard_common::{DockyardError, Result, RunId};
use dockyard_config::Config;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::affinity::{extract_affinity, format_affinity, parse_pose_table, PoseScore};
use crate::cancel::CancelToken;
use crate::docking::{DockingConfig, VinaRunner};
use crate::ligand::LigandPreparer;
use crate::pose::{complex, model_count, top_pose};
use crate::receptor::write_receptor;
use crate::search_box::{BoxLimits, SearchBox};
use crate::workspace::RunWorkspace;

// ── Request ───────────────────────────────────────────────────────────────────

/// Everything the form collected for one run.
#[derive(Debug, Clone)]
pub struct DockingRequest {
    /// Raw bytes of the uploaded receptor file.
    pub receptor: Vec<u8>,
    pub smiles: String,
    pub search_box: SearchBox,
}

// ── Progress events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    PreparingReceptor,
    PreparingLigand,
    Queued,
    Docking,
    ExtractingResults,
}

impl RunStage {
    pub fn label(&self) -> &'static str {
        match self {
            RunStage::PreparingReceptor => "Cleaning receptor",
            RunStage::PreparingLigand => "Preparing ligand structure",
            RunStage::Queued => "Waiting for a free docking slot",
            RunStage::Docking => "Docking in progress",
            RunStage::ExtractingResults => "Reading results",
        }
    }
}

/// Progress event emitted during a run (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct RunProgress {
    pub run_id: RunId,
    pub stage: RunStage,
    pub message: String,
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// A successful run: Vina exited with status zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockingOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub poses: Vec<PoseScore>,
    /// Rank-1 affinity in kcal/mol; `None` when Vina's table was not found.
    pub affinity: Option<f64>,
    /// Number of MODEL records in Vina's output file.
    pub pose_count: usize,
    pub receptor: String,
    pub docked_pose: String,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl DockingOutcome {
    pub fn affinity_label(&self) -> String {
        format_affinity(self.affinity)
    }

    pub fn complex(&self) -> String {
        complex(&self.receptor, &self.docked_pose)
    }
}

// ── Pipeline orchestrator ─────────────────────────────────────────────────────

pub struct DockingPipeline {
    vina: VinaRunner,
    preparer: Arc<dyn LigandPreparer>,
    work_root: PathBuf,
    keep_run_dirs: bool,
    limits: BoxLimits,
    docking_slots: Arc<Semaphore>,
}

impl DockingPipeline {
    pub fn new<P: AsRef<Path>>(
        vina: VinaRunner,
        preparer: Arc<dyn LigandPreparer>,
        work_root: P,
        limits: BoxLimits,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            vina,
            preparer,
            work_root: work_root.as_ref().to_path_buf(),
            keep_run_dirs: false,
            limits,
            docking_slots: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
        }
    }

    pub fn from_config(config: &Config, preparer: Arc<dyn LigandPreparer>) -> Self {
        let vina = VinaRunner::new(
            &config.tools.vina_path,
            Duration::from_secs(config.limits.vina_timeout_secs),
        );
        Self::new(
            vina,
            preparer,
            &config.workspace.root,
            BoxLimits::from(&config.limits),
            config.limits.max_concurrent_runs,
        )
        .keep_run_dirs(config.workspace.keep_run_dirs)
    }

    pub fn keep_run_dirs(mut self, keep: bool) -> Self {
        self.keep_run_dirs = keep;
        self
    }

    pub fn vina(&self) -> &VinaRunner {
        &self.vina
    }

    pub fn limits(&self) -> BoxLimits {
        self.limits
    }

    /// Run every stage for `request`. Progress events are sent via
    /// `progress_tx` if provided.
    #[instrument(skip(self, request, cancel, progress_tx))]
    pub async fn run(
        &self,
        run_id: RunId,
        request: DockingRequest,
        cancel: &CancelToken,
        progress_tx: Option<broadcast::Sender<RunProgress>>,
    ) -> Result<DockingOutcome> {
        request.search_box.validate(self.limits)?;

        let t0 = std::time::Instant::now();
        info!(smiles = %request.smiles, "Starting docking run");

        let emit = |stage: RunStage| {
            if let Some(ref tx) = progress_tx {
                let _ = tx.send(RunProgress {
                    run_id,
                    stage,
                    message: stage.label().to_string(),
                });
            }
        };

        let workspace = RunWorkspace::create(&self.work_root, run_id).await?;
        let result = self.run_stages(&workspace, &request, cancel, &emit).await;
        if self.keep_run_dirs {
            debug!("Keeping run workspace {:?}", workspace.dir());
        } else {
            workspace.remove().await;
        }

        let mut outcome = result?;
        outcome.duration_ms = t0.elapsed().as_millis() as u64;
        info!(affinity = %outcome.affinity_label(), ms = outcome.duration_ms, "Docking run finished");
        Ok(outcome)
    }

    async fn run_stages(
        &self,
        workspace: &RunWorkspace,
        request: &DockingRequest,
        cancel: &CancelToken,
        emit: &(dyn Fn(RunStage) + Send + Sync),
    ) -> Result<DockingOutcome> {
        // ── 1. Receptor ───────────────────────────────────────────────────────
        emit(RunStage::PreparingReceptor);
        let receptor = write_receptor(&request.receptor, &workspace.receptor_path()).await?;

        // ── 2. Ligand ─────────────────────────────────────────────────────────
        emit(RunStage::PreparingLigand);
        let ligand_path = workspace.ligand_path();
        tokio::select! {
            prepared = self.preparer.prepare(&request.smiles, &ligand_path) => prepared?,
            _ = cancel.cancelled() => return Err(DockyardError::Cancelled),
        }

        // ── 3. Docking ────────────────────────────────────────────────────────
        let slot = match self.docking_slots.clone().try_acquire_owned() {
            Ok(slot) => slot,
            Err(_) => {
                emit(RunStage::Queued);
                tokio::select! {
                    slot = self.docking_slots.clone().acquire_owned() => {
                        slot.map_err(|e| DockyardError::Other(e.into()))?
                    }
                    _ = cancel.cancelled() => return Err(DockyardError::Cancelled),
                }
            }
        };

        emit(RunStage::Docking);
        let config = DockingConfig::new(
            workspace.receptor_path(),
            workspace.ligand_path(),
            workspace.output_path(),
            &request.search_box,
        );
        let vina = self.vina.run(&config, cancel).await?;
        drop(slot);

        // ── 4. Results ────────────────────────────────────────────────────────
        emit(RunStage::ExtractingResults);
        let output = match fs::read_to_string(workspace.output_path()).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Vina exited cleanly but wrote no output file");
                String::new()
            }
            Err(e) => return Err(e.into()),
        };

        let affinity = extract_affinity(&vina.stdout);
        if affinity.is_none() {
            warn!("No rank-1 row in Vina's results table; affinity unavailable");
        }

        Ok(DockingOutcome {
            exit_code: vina.exit_code,
            poses: parse_pose_table(&vina.stdout),
            affinity,
            pose_count: model_count(&output),
            docked_pose: top_pose(&output),
            stdout: vina.stdout,
            stderr: vina.stderr,
            receptor,
            duration_ms: 0,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::ligand::OpenBabelPreparer;
    use crate::testing::{write_script, StubPreparer, FAKE_VINA};
    use std::sync::atomic::Ordering;
    use tempfile::{tempdir, TempDir};

    const RECEPTOR: &str = "\
ATOM      1  N   MET A   1      27.340  24.430   2.614  1.00  0.00    -0.079 N
ATOM      2  CA  MET A   1      26.266  25.413   2.842  1.00  0.00     0.246 C
CONECT    1    2
";

    fn request(smiles: &str) -> DockingRequest {
        DockingRequest {
            receptor: RECEPTOR.as_bytes().to_vec(),
            smiles: smiles.to_string(),
            search_box: SearchBox {
                center: [26.0, 25.0, 3.0],
                size: [20.0, 20.0, 20.0],
                exhaustiveness: 8,
            },
        }
    }

    fn pipeline(dir: &TempDir, vina_body: &str, preparer: Arc<dyn LigandPreparer>) -> DockingPipeline {
        let vina = write_script(dir.path(), "vina", vina_body);
        DockingPipeline::new(
            VinaRunner::new(vina, Duration::from_secs(10)),
            preparer,
            dir.path().join("runs"),
            BoxLimits::default(),
            2,
        )
    }

    #[tokio::test]
    async fn test_successful_run() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = broadcast::channel(16);
        let p = pipeline(&dir, FAKE_VINA, Arc::new(StubPreparer::default()));

        let run_id = RunId::new();
        let outcome = p.run(run_id, request("CCO"), &CancelToken::never(), Some(tx)).await.unwrap();

        assert_eq!(outcome.affinity, Some(-7.2));
        assert_eq!(outcome.affinity_label(), "-7.2");
        assert_eq!(outcome.poses.len(), 3);
        assert_eq!(outcome.pose_count, 2);
        assert!(!outcome.receptor.contains("CONECT"));
        assert!(outcome.docked_pose.contains("10.517"));
        assert!(!outcome.docked_pose.contains("9.880"));
        assert!(outcome.complex().starts_with(&outcome.receptor));

        let mut stages = Vec::new();
        while let Ok(p) = rx.try_recv() {
            assert_eq!(p.run_id, run_id);
            stages.push(p.stage);
        }
        assert_eq!(
            stages,
            [RunStage::PreparingReceptor, RunStage::PreparingLigand, RunStage::Docking, RunStage::ExtractingResults]
        );
        assert!(!dir.path().join("runs").join(run_id.to_string()).exists());
    }

    #[tokio::test]
    async fn test_missing_table_degrades_to_placeholder() {
        let dir = tempdir().unwrap();
        let p = pipeline(&dir, "echo 'Refining results ... done.'\n", Arc::new(StubPreparer::default()));

        let outcome = p.run(RunId::new(), request("CCO"), &CancelToken::never(), None).await.unwrap();
        assert_eq!(outcome.affinity, None);
        assert_eq!(outcome.affinity_label(), "N/A");
        assert_eq!(outcome.docked_pose, "");
    }

    #[tokio::test]
    async fn test_invalid_smiles_skips_docking() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("vina-was-called");
        let body = format!("touch {}\n{}", marker.display(), FAKE_VINA);
        let preparer = Arc::new(OpenBabelPreparer::new(dir.path().join("no-obabel"), Duration::from_secs(5)));
        let p = pipeline(&dir, &body, preparer);

        for smiles in ["", "!!!notachemical"] {
            let err = p.run(RunId::new(), request(smiles), &CancelToken::never(), None).await.unwrap_err();
            assert!(matches!(err, DockyardError::InvalidDescriptor(_)));
        }
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit_does_not_read_output() {
        let dir = tempdir().unwrap();
        let body = "echo 'ERROR: could not open receptor'\necho 'garbage' > \"$(dirname \"$4\")/output.pdbqt\"\nexit 2\n";
        let p = pipeline(&dir, body, Arc::new(StubPreparer::default()));

        let err = p.run(RunId::new(), request("CCO"), &CancelToken::never(), None).await.unwrap_err();
        match err {
            DockyardError::DockingFailed { code, stdout, .. } => {
                assert_eq!(code, Some(2));
                assert!(stdout.contains("could not open receptor"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_box_stops_before_any_file_is_written() {
        let dir = tempdir().unwrap();
        let stub = Arc::new(StubPreparer::default());
        let p = pipeline(&dir, FAKE_VINA, stub.clone());

        let mut req = request("CCO");
        req.search_box.size = [0.0; 3];
        let err = p.run(RunId::new(), req, &CancelToken::never(), None).await.unwrap_err();
        assert!(matches!(err, DockyardError::InvalidSearchBox(_)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("runs").exists());
    }

    #[tokio::test]
    async fn test_successive_runs_do_not_share_files() {
        let dir = tempdir().unwrap();
        let p = pipeline(&dir, FAKE_VINA, Arc::new(StubPreparer::default())).keep_run_dirs(true);

        let first = RunId::new();
        let second = RunId::new();
        let mut req = request("CCO");
        p.run(first, req.clone(), &CancelToken::never(), None).await.unwrap();
        req.receptor = b"ATOM      9  O   HOH W   1\n".to_vec();
        p.run(second, req, &CancelToken::never(), None).await.unwrap();

        let root = dir.path().join("runs");
        let first_receptor = std::fs::read_to_string(root.join(first.to_string()).join("receptor.pdbqt")).unwrap();
        let second_receptor = std::fs::read_to_string(root.join(second.to_string()).join("receptor.pdbqt")).unwrap();
        assert!(first_receptor.contains("MET"));
        assert_eq!(second_receptor, "ATOM      9  O   HOH W   1\n");
    }

    #[tokio::test]
    async fn test_cancel_during_docking() {
        let dir = tempdir().unwrap();
        let p = pipeline(&dir, "sleep 30\n", Arc::new(StubPreparer::default()));
        let (handle, token) = cancel_pair();
        let (tx, mut rx) = broadcast::channel(16);

        let run = p.run(RunId::new(), request("CCO"), &token, Some(tx));
        tokio::pin!(run);
        loop {
            tokio::select! {
                _ = &mut run => panic!("run finished before cancel"),
                progress = rx.recv() => {
                    if progress.unwrap().stage == RunStage::Docking {
                        break;
                    }
                }
            }
        }
        handle.cancel();
        let err = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap_err();
        assert!(matches!(err, DockyardError::Cancelled));
    }
}
