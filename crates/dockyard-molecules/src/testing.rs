//! Fakes for the external tools, shared by this crate's tests.

use async_trait::async_trait;
use dockyard_common::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ligand::LigandPreparer;

/// Mimics Vina: prints a results table and writes two poses to `--out`.
pub const FAKE_VINA: &str = r#"out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift ;;
  esac
  shift
done
cat <<'TABLE'
AutoDock Vina v1.2.5
Performing docking (random seed: 1234) ... done.

mode |   affinity | dist from best mode
     | (kcal/mol) | rmsd l.b.| rmsd u.b.
-----+------------+----------+----------
   1         -7.2      0.000      0.000
   2       -6.851      1.912      2.447
   3         -6.5      2.030      4.118
TABLE
cat > "$out" <<'POSES'
MODEL 1
REMARK VINA RESULT:    -7.2      0.000      0.000
HETATM    1  C   UNL     1      10.517  -4.238  22.054  1.00  0.00     0.028 C
HETATM    2  O   UNL     1      11.304  -3.101  21.727  1.00  0.00    -0.396 OA
ENDMDL
MODEL 2
REMARK VINA RESULT:    -6.851    1.912      2.447
HETATM    1  C   UNL     1       9.880  -4.902  23.114  1.00  0.00     0.028 C
ENDMDL
POSES
"#;

/// Write an executable `/bin/sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub const STUB_LIGAND: &str = "\
REMARK  Name = ethanol
ROOT
ATOM      1  C   UNL     1       0.000   0.000   0.000  0.00  0.00    +0.000 C
ATOM      2  O   UNL     1       1.430   0.000   0.000  0.00  0.00    -0.396 OA
ENDROOT
TORSDOF 0
";

/// Writes [`STUB_LIGAND`] for every SMILES and counts calls.
#[derive(Default)]
pub struct StubPreparer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl LigandPreparer for StubPreparer {
    async fn prepare(&self, _smiles: &str, out: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(out, STUB_LIGAND).await?;
        Ok(())
    }
}
