//! Molecular docking using AutoDock Vina.

use dockyard_common::{DockyardError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::search_box::SearchBox;

/// Configuration for a docking run.
#[derive(Debug, Clone)]
pub struct DockingConfig {
    pub receptor: PathBuf,
    pub ligand: PathBuf,
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    pub size_x: f64,
    pub size_y: f64,
    pub size_z: f64,
    pub exhaustiveness: u32,
    pub out: PathBuf,
}

impl DockingConfig {
    pub fn new(receptor: PathBuf, ligand: PathBuf, out: PathBuf, search_box: &SearchBox) -> Self {
        let [center_x, center_y, center_z] = search_box.center;
        let [size_x, size_y, size_z] = search_box.size;
        Self {
            receptor,
            ligand,
            center_x,
            center_y,
            center_z,
            size_x,
            size_y,
            size_z,
            exhaustiveness: search_box.exhaustiveness,
            out,
        }
    }
}

/// What Vina printed and how it exited.
#[derive(Debug, Clone)]
pub struct VinaOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Wrapper for AutoDock Vina execution.
pub struct VinaRunner {
    executable_path: PathBuf,
    timeout: Duration,
}

impl VinaRunner {
    /// Create a new VinaRunner.
    pub fn new<P: AsRef<Path>>(executable_path: P, timeout: Duration) -> Self {
        Self {
            executable_path: executable_path.as_ref().to_path_buf(),
            timeout,
        }
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    /// Fail with [`DockyardError::BinaryMissing`] unless the binary exists at the
    /// configured path or, for a bare name, answers `--version` from PATH.
    pub async fn ensure_available(&self) -> Result<()> {
        if self.executable_path.is_file() {
            return Ok(());
        }

        let bare_name = self.executable_path.components().count() == 1;
        if bare_name {
            let probe = Command::new(&self.executable_path)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if probe.is_ok() {
                return Ok(());
            }
        }

        Err(DockyardError::BinaryMissing(format!(
            "AutoDock Vina not found at {}",
            self.executable_path.display()
        )))
    }

    /// The exact command line for `config`. Argument order is fixed.
    pub fn command(&self, config: &DockingConfig) -> Command {
        let mut cmd = Command::new(&self.executable_path);
        cmd.arg("--receptor")
            .arg(&config.receptor)
            .arg("--ligand")
            .arg(&config.ligand)
            .arg("--center_x")
            .arg(config.center_x.to_string())
            .arg("--center_y")
            .arg(config.center_y.to_string())
            .arg("--center_z")
            .arg(config.center_z.to_string())
            .arg("--size_x")
            .arg(config.size_x.to_string())
            .arg("--size_y")
            .arg(config.size_y.to_string())
            .arg("--size_z")
            .arg(config.size_z.to_string())
            .arg("--exhaustiveness")
            .arg(config.exhaustiveness.to_string())
            .arg("--out")
            .arg(&config.out);
        cmd
    }

    /// Run AutoDock Vina with the given configuration and wait for it to exit,
    /// the timeout to pass, or `cancel` to fire. The child is killed in the
    /// latter two cases.
    pub async fn run(&self, config: &DockingConfig, cancel: &CancelToken) -> Result<VinaOutput> {
        info!("Running AutoDock Vina on {:?}", config.ligand);

        let child = self
            .command(config)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DockyardError::BinaryMissing(format!(
                    "AutoDock Vina not found at {}",
                    self.executable_path.display()
                )),
                _ => DockyardError::Io(e),
            })?;

        let output = tokio::select! {
            waited = tokio::time::timeout(self.timeout, child.wait_with_output()) => match waited {
                Ok(output) => output?,
                Err(_) => {
                    warn!("AutoDock Vina exceeded {:?}, killing it", self.timeout);
                    return Err(DockyardError::DockingTimedOut(self.timeout.as_secs()));
                }
            },
            _ = cancel.cancelled() => {
                info!("AutoDock Vina run cancelled, killing it");
                return Err(DockyardError::Cancelled);
            }
        };

        let result = VinaOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() {
            warn!("AutoDock Vina failed with {:?}", result.exit_code);
            return Err(DockyardError::DockingFailed {
                code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        debug!("AutoDock Vina completed successfully. Output in {:?}", config.out);
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::testing::{write_script, FAKE_VINA};
    use std::ffi::OsStr;
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> DockingConfig {
        let search_box = SearchBox {
            center: [1.5, -2.0, 3.25],
            size: [20.0, 18.0, 16.0],
            exhaustiveness: 8,
        };
        DockingConfig::new(
            dir.join("receptor.pdbqt"),
            dir.join("ligand.pdbqt"),
            dir.join("output.pdbqt"),
            &search_box,
        )
    }

    #[test]
    fn test_command_line_shape() {
        let dir = tempdir().unwrap();
        let cfg = config_in(dir.path());
        let runner = VinaRunner::new("./vina", Duration::from_secs(5));
        let cmd = runner.command(&cfg);
        let args: Vec<&OsStr> = cmd.as_std().get_args().collect();

        let flags: Vec<&str> = args.iter().step_by(2).map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            flags,
            [
                "--receptor", "--ligand", "--center_x", "--center_y", "--center_z",
                "--size_x", "--size_y", "--size_z", "--exhaustiveness", "--out",
            ]
        );
        assert_eq!(args[5], "1.5");
        assert_eq!(args[7], "-2");
        assert_eq!(args[11], "20");
        assert_eq!(args[13], "18");
        assert_eq!(args[17], "8");
        assert_eq!(cmd.as_std().get_program(), "./vina");
    }

    #[tokio::test]
    async fn test_successful_run_captures_stdout() {
        let dir = tempdir().unwrap();
        let vina = write_script(dir.path(), "vina", FAKE_VINA);
        let cfg = config_in(dir.path());

        let out = VinaRunner::new(&vina, Duration::from_secs(10))
            .run(&cfg, &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert!(out.stdout.contains("-7.2"));
        assert!(cfg.out.exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_stdout() {
        let dir = tempdir().unwrap();
        let vina = write_script(
            dir.path(),
            "vina",
            "echo 'ERROR: the search space volume is zero'\nexit 1\n",
        );

        let err = VinaRunner::new(&vina, Duration::from_secs(10))
            .run(&config_in(dir.path()), &CancelToken::never())
            .await
            .unwrap_err();
        match err {
            DockyardError::DockingFailed { code, stdout, .. } => {
                assert_eq!(code, Some(1));
                assert!(stdout.contains("search space volume is zero"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempdir().unwrap();
        let vina = write_script(dir.path(), "vina", "sleep 30\n");

        let err = VinaRunner::new(&vina, Duration::from_millis(200))
            .run(&config_in(dir.path()), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, DockyardError::DockingTimedOut(_)));
    }

    #[tokio::test]
    async fn test_cancel_stops_run() {
        let dir = tempdir().unwrap();
        let vina = write_script(dir.path(), "vina", "sleep 30\n");
        let (handle, token) = cancel_pair();

        let runner = VinaRunner::new(&vina, Duration::from_secs(60));
        let cfg = config_in(dir.path());
        let run = runner.run(&cfg, &token);
        tokio::pin!(run);

        tokio::select! {
            _ = &mut run => panic!("run finished before cancel"),
            _ = tokio::time::sleep(Duration::from_millis(100)) => handle.cancel(),
        }
        let err = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap_err();
        assert!(matches!(err, DockyardError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempdir().unwrap();
        let runner = VinaRunner::new(dir.path().join("no-such-vina"), Duration::from_secs(1));
        assert!(matches!(
            runner.ensure_available().await,
            Err(DockyardError::BinaryMissing(_))
        ));
        let err = runner.run(&config_in(dir.path()), &CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, DockyardError::BinaryMissing(_)));
    }

    #[tokio::test]
    async fn test_present_binary_is_available() {
        let dir = tempdir().unwrap();
        let vina = write_script(dir.path(), "vina", FAKE_VINA);
        assert!(VinaRunner::new(&vina, Duration::from_secs(1)).ensure_available().await.is_ok());
    }
}
