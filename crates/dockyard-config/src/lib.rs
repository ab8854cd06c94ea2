//! Configuration loading for Dockyard.
//! Reads dockyard.toml from the current directory or the path in DOCKYARD_CONFIG.
//! Every field has a default, so a missing default file is not an error.

use dockyard_common::{DockyardError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "DOCKYARD_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "dockyard.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "127.0.0.1:8501".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_vina_path")]
    pub vina_path: PathBuf,
    #[serde(default = "default_obabel_path")]
    pub obabel_path: PathBuf,
}

fn default_vina_path()   -> PathBuf { PathBuf::from("./vina") }
fn default_obabel_path() -> PathBuf { PathBuf::from("obabel") }

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            vina_path: default_vina_path(),
            obabel_path: default_obabel_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_vina_timeout")]
    pub vina_timeout_secs: u64,
    #[serde(default = "default_prep_timeout")]
    pub prep_timeout_secs: u64,
    /// Largest accepted edge of the search box, in Angstrom.
    #[serde(default = "default_max_box_edge")]
    pub max_box_edge: f64,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_vina_timeout()        -> u64   { 900 }
fn default_prep_timeout()        -> u64   { 120 }
fn default_max_box_edge()        -> f64   { 126.0 }
fn default_max_concurrent_runs() -> usize { 2 }
fn default_max_upload_bytes()    -> usize { 50 * 1024 * 1024 }

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            vina_timeout_secs: default_vina_timeout(),
            prep_timeout_secs: default_prep_timeout(),
            max_box_edge: default_max_box_edge(),
            max_concurrent_runs: default_max_concurrent_runs(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent of the per-run working directories.
    #[serde(default = "default_work_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub keep_run_dirs: bool,
}

fn default_work_root() -> PathBuf { PathBuf::from("./runs") }

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { root: default_work_root(), keep_run_dirs: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
}

fn default_idle_secs() -> u64 { 60 * 60 * 12 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self { idle_secs: default_idle_secs() }
    }
}


impl Config {
    /// Load configuration from dockyard.toml.
    /// Checks DOCKYARD_CONFIG first, then the current directory.
    /// An explicitly named file that does not exist is an error; a missing
    /// default file falls back to built-in defaults.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                if !Path::new(&path).exists() {
                    return Err(DockyardError::Config(format!(
                        "Config file not found: {} (set by {})",
                        path, CONFIG_ENV
                    )));
                }
                Self::from_file(&path)?
            }
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => {
                info!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                Self::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    /// Environment variables win over the file. The lookup is injected so
    /// tests do not touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("DOCKYARD_BIND") {
            self.server.bind = bind;
        }
        if let Some(vina) = lookup("DOCKYARD_VINA_PATH") {
            self.tools.vina_path = PathBuf::from(vina);
        }
        if let Some(obabel) = lookup("DOCKYARD_OBABEL_PATH") {
            self.tools.obabel_path = PathBuf::from(obabel);
        }
        if let Some(root) = lookup("DOCKYARD_WORK_ROOT") {
            self.workspace.root = PathBuf::from(root);
        }
        if let Some(timeout) = lookup("DOCKYARD_VINA_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.limits.vina_timeout_secs = secs,
                Err(_) => warn!("Ignoring non-numeric DOCKYARD_VINA_TIMEOUT_SECS={}", timeout),
            }
        }
    }
}
