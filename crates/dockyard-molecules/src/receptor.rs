//! Receptor cleanup before docking.
//!
//! Vina's PDBQT parser can stall on the CONECT records some exporters add,
//! so they are dropped. Nothing else in the upload is touched.

use dockyard_common::{DockyardError, Result};
use std::path::Path;
use tokio::fs;
use tracing::debug;

pub const CONNECTIVITY_RECORD: &str = "CONECT";

/// Accepted upload extensions, lowercase.
pub const RECEPTOR_EXTENSIONS: &[&str] = &["pdbqt"];

/// Drop every line starting with `CONECT`. Every other line is kept with its
/// terminator, blank lines included; `\r\n` becomes `\n`.
pub fn sanitize_receptor(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for line in text
        .split_inclusive('\n')
        .filter(|line| !line.starts_with(CONNECTIVITY_RECORD))
    {
        match line.strip_suffix("\r\n") {
            Some(body) => {
                cleaned.push_str(body);
                cleaned.push('\n');
            }
            None => cleaned.push_str(line),
        }
    }
    cleaned
}

/// Whether `file_name` carries one of [`RECEPTOR_EXTENSIONS`].
pub fn has_receptor_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RECEPTOR_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode the uploaded bytes, sanitize them and write the result to `path`,
/// replacing whatever was there. Returns the sanitized text.
///
/// An empty upload produces an empty file; Vina reports that later.
pub async fn write_receptor(bytes: &[u8], path: &Path) -> Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        DockyardError::InvalidReceptor(format!("upload is not UTF-8 text: {}", e))
    })?;

    let cleaned = sanitize_receptor(text);
    let dropped = text.lines().count() - cleaned.lines().count();
    debug!("Receptor sanitized: {} CONECT records dropped", dropped);

    fs::write(path, &cleaned).await?;
    Ok(cleaned)
}
