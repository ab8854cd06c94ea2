//! Ligand preparation: SMILES in, docking-ready PDBQT out.
//!
//! The chemistry is delegated to Open Babel (`obabel` on PATH or at a
//! configured path), run in three separate steps so each failure maps to its
//! own error:
//! 1. canonicalize the SMILES (parse check)
//! 2. add hydrogens and generate one 3D conformer
//! 3. convert the conformer to PDBQT with Gasteiger charges

use async_trait::async_trait;
use dockyard_common::{DockyardError, Result};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

/// Turns a SMILES string into a PDBQT file at `out`.
#[async_trait]
pub trait LigandPreparer: Send + Sync {
    async fn prepare(&self, smiles: &str, out: &Path) -> Result<()>;
}

/// Characters that may appear in a SMILES string outside of bracket atoms.
fn is_smiles_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "()[]=#$:/\\.%+-@*".contains(c)
}

/// Cheap syntactic screen run before any tool is spawned. It catches empty
/// input, stray characters, unbalanced brackets and unclosed ring bonds; it
/// does not check valence or aromaticity.
pub fn check_smiles_syntax(smiles: &str) -> Result<()> {
    let invalid = |why: String| Err(DockyardError::InvalidDescriptor(why));

    if smiles.is_empty() {
        return invalid("SMILES string is empty".to_string());
    }
    if let Some(c) = smiles.chars().find(|c| !is_smiles_char(*c)) {
        return invalid(format!("unexpected character {:?} in {:?}", c, smiles));
    }

    let mut depth = 0i32;
    let mut in_bracket = false;
    let mut ring_bonds = [0u32; 100];
    let mut chars = smiles.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '[' if in_bracket => return invalid("nested '[' in bracket atom".to_string()),
            '[' => in_bracket = true,
            ']' if !in_bracket => return invalid("']' without matching '['".to_string()),
            ']' => in_bracket = false,
            _ if in_bracket => {}
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return invalid("')' without matching '('".to_string());
                }
            }
            '%' => {
                let label: String = chars.by_ref().take(2).collect();
                if label.len() != 2 || !label.bytes().all(|b| b.is_ascii_digit()) {
                    return invalid("'%' must be followed by two digits".to_string());
                }
                match label.parse::<usize>() {
                    Ok(n) => ring_bonds[n] += 1,
                    Err(_) => return invalid("'%' must be followed by two digits".to_string()),
                }
            }
            d if d.is_ascii_digit() => ring_bonds[d as usize - '0' as usize] += 1,
            _ => {}
        }
    }

    if in_bracket {
        return invalid("unclosed '['".to_string());
    }
    if depth != 0 {
        return invalid("unbalanced parentheses".to_string());
    }
    if let Some(label) = ring_bonds.iter().position(|n| n % 2 == 1) {
        return invalid(format!("ring bond {} is never closed", label));
    }
    Ok(())
}

/// Whether an SDF molblock carries real 3D coordinates. A single atom counts
/// as embedded wherever it sits.
pub fn sdf_has_3d_coordinates(sdf: &str) -> bool {
    let lines: Vec<&str> = sdf.lines().collect();
    let Some(atom_count) = lines
        .get(3)
        .and_then(|counts| counts.get(0..3))
        .and_then(|n| n.trim().parse::<usize>().ok())
    else {
        return false;
    };
    if atom_count == 0 || lines.len() < 4 + atom_count {
        return false;
    }
    if atom_count == 1 {
        return true;
    }

    lines[4..4 + atom_count].iter().any(|line| {
        line.split_whitespace()
            .take(3)
            .filter_map(|v| v.parse::<f64>().ok())
            .any(|v| v.abs() > 1e-4)
    })
}

/// Number of ATOM/HETATM records in a PDBQT text.
pub fn pdbqt_atom_count(pdbqt: &str) -> usize {
    pdbqt
        .lines()
        .filter(|l| l.starts_with("ATOM") || l.starts_with("HETATM"))
        .count()
}

/// [`LigandPreparer`] backed by the Open Babel command line tool.
pub struct OpenBabelPreparer {
    executable_path: PathBuf,
    timeout: Duration,
}

impl OpenBabelPreparer {
    pub fn new<P: AsRef<Path>>(executable_path: P, timeout: Duration) -> Self {
        Self {
            executable_path: executable_path.as_ref().to_path_buf(),
            timeout,
        }
    }

    /// Probe `obabel -V`; false when the tool cannot be started.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.executable_path)
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok()
    }

    async fn babel(&self, args: Vec<OsString>) -> Result<Output> {
        debug!("obabel {:?}", args);
        let child = Command::new(&self.executable_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DockyardError::BinaryMissing(format!(
                    "Open Babel not found at {}",
                    self.executable_path.display()
                )),
                _ => DockyardError::Io(e),
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(DockyardError::PreparationFailure(format!(
                "Open Babel did not finish within {} seconds",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Step 1: parse and canonicalize. Zero converted molecules means the
    /// SMILES did not describe a structure.
    pub async fn canonicalize(&self, smiles: &str) -> Result<String> {
        let output = self
            .babel(vec![format!("-:{}", smiles).into(), "-ocan".into()])
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.split_whitespace().next() {
            Some(canonical) if output.status.success() => Ok(canonical.to_string()),
            _ => Err(DockyardError::InvalidDescriptor(format!(
                "could not parse {:?}: {}",
                smiles,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    /// Step 2: explicit hydrogens plus one 3D conformer, written as SDF.
    async fn embed(&self, smiles: &str, sdf: &Path) -> Result<()> {
        let output = self
            .babel(vec![
                format!("-:{}", smiles).into(),
                "-h".into(),
                "--gen3d".into(),
                "-osdf".into(),
                "-O".into(),
                sdf.as_os_str().to_owned(),
            ])
            .await?;

        let written = fs::read_to_string(sdf).await.unwrap_or_default();
        if !output.status.success() || !sdf_has_3d_coordinates(&written) {
            return Err(DockyardError::EmbeddingFailure(format!(
                "no 3D geometry generated for {:?}: {}",
                smiles,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Step 3: SDF to PDBQT with Gasteiger partial charges.
    async fn convert(&self, sdf: &Path, out: &Path) -> Result<()> {
        let output = self
            .babel(vec![
                sdf.as_os_str().to_owned(),
                "-opdbqt".into(),
                "-O".into(),
                out.as_os_str().to_owned(),
                "--partialcharge".into(),
                "gasteiger".into(),
            ])
            .await?;

        let written = fs::read_to_string(out).await.unwrap_or_default();
        if !output.status.success() || pdbqt_atom_count(&written) == 0 {
            return Err(DockyardError::PreparationFailure(format!(
                "PDBQT conversion produced no atoms: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LigandPreparer for OpenBabelPreparer {
    async fn prepare(&self, smiles: &str, out: &Path) -> Result<()> {
        let smiles = smiles.trim();
        check_smiles_syntax(smiles)?;

        info!("Preparing ligand {}", smiles);
        let canonical = self.canonicalize(smiles).await?;
        if canonical.contains('.') {
            return Err(DockyardError::PreparationFailure(format!(
                "{:?} has several disconnected fragments; dock one molecule at a time",
                smiles
            )));
        }

        let sdf = out.with_extension("sdf");
        self.embed(&canonical, &sdf).await?;
        self.convert(&sdf, out).await?;

        debug!("Ligand written to {:?}", out);
        Ok(())
    }
}
