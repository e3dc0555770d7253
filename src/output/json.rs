//! Per-change JSON artifacts
//!
//! Writes go through a temp file in the target directory which is then
//! persisted without clobbering, so a crash never leaves a truncated artifact
//! and an existing artifact is never overwritten.

use super::{ChangesLayout, OutputError, OutputResult};
use crate::ChangeDetail;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write `detail` unchanged as `<dir>/<number>.json`
///
/// The file is named by the requested `number`, whatever `_number` the body
/// carries. Returns [`OutputError::AlreadyExists`] if the artifact is already
/// there.
pub fn write_artifact(dir: &Path, number: u64, detail: &ChangeDetail) -> OutputResult<PathBuf> {
    let path = ChangesLayout::artifact_path(dir, number);
    if path.exists() {
        return Err(OutputError::AlreadyExists(path));
    }

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;

    serde_json::to_writer_pretty(&mut temp_file, detail)
        .map_err(|e| OutputError::SerializationError(e.to_string()))?;
    temp_file
        .write_all(b"\n")
        .map_err(|e| OutputError::IoError(format!("Failed to write to temp file: {e}")))?;

    // Flush and sync before the rename so the artifact is complete once visible
    temp_file
        .flush()
        .map_err(|e| OutputError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| OutputError::IoError(format!("Failed to sync temp file: {e}")))?;

    temp_file.persist_noclobber(&path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            OutputError::AlreadyExists(path.clone())
        } else {
            OutputError::IoError(format!("Failed to persist {}: {}", path.display(), e.error))
        }
    })?;

    debug!(path = %path.display(), "Artifact written");
    Ok(path)
}

/// Change numbers already materialized in `dir`
///
/// Only `<number>.json` files count; temp files and anything else are ignored.
/// A missing directory has no artifacts.
pub fn existing_artifacts(dir: &Path) -> OutputResult<BTreeSet<u64>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => {
            return Err(OutputError::IoError(format!(
                "Failed to read {}: {}",
                dir.display(),
                e
            )))
        }
    };

    let mut numbers = BTreeSet::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| OutputError::IoError(format!("Failed to read directory entry: {e}")))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            if let Some(number) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                numbers.insert(number);
            }
        }
    }
    Ok(numbers)
}
