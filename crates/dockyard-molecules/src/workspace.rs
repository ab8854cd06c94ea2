//! Per-run working directories.

use dockyard_common::{Result, RunId};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub const RECEPTOR_FILE: &str = "receptor.pdbqt";
pub const LIGAND_FILE: &str = "ligand.pdbqt";
pub const OUTPUT_FILE: &str = "output.pdbqt";

/// `<root>/<run id>/` holding the receptor, ligand and output files of one
/// run. No two runs share a directory.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: PathBuf,
}

impl RunWorkspace {
    /// Create a fresh, empty directory for `run_id`. Leftovers from a
    /// previous use of the same id are removed first.
    pub async fn create(root: &Path, run_id: RunId) -> Result<Self> {
        let dir = root.join(run_id.to_string());
        if fs::try_exists(&dir).await? {
            fs::remove_dir_all(&dir).await?;
        }
        fs::create_dir_all(&dir).await?;
        debug!("Run workspace created at {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn receptor_path(&self) -> PathBuf {
        self.dir.join(RECEPTOR_FILE)
    }

    pub fn ligand_path(&self) -> PathBuf {
        self.dir.join(LIGAND_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.join(OUTPUT_FILE)
    }

    /// Delete the directory. Failure is logged, not returned: the run's
    /// result is already decided by then.
    pub async fn remove(self) {
        if let Err(e) = fs::remove_dir_all(&self.dir).await {
            warn!("Could not remove run workspace {:?}: {}", self.dir, e);
        }
    }
}
