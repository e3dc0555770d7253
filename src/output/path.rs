//! Directory layout for one tracked source
//!
//! [`ChangesLayout`] knows where frame directories and artifacts live, creates
//! missing frame directories and enumerates the ones already on disk.

use super::{OutputError, OutputResult};
use crate::TimeFrame;
use chrono::Duration;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the directory holding frame directories
const CHANGES_DIR: &str = "changes";

/// Name of the per-source lock file
const LOCK_FILE: &str = ".lock";

/// Paths for `<root>/<source>/changes/<frame>/<number>.json`
#[derive(Debug, Clone)]
pub struct ChangesLayout {
    root_dir: PathBuf,
    source: String,
}

impl ChangesLayout {
    /// Create a layout
    ///
    /// The source name is sanitized so it stays a single path component.
    pub fn new(root_dir: impl Into<PathBuf>, source_name: &str) -> Self {
        Self {
            root_dir: root_dir.into(),
            source: sanitize_source(source_name),
        }
    }

    /// `<root>/<source>`
    pub fn source_dir(&self) -> PathBuf {
        self.root_dir.join(&self.source)
    }

    /// `<root>/<source>/changes`
    pub fn changes_dir(&self) -> PathBuf {
        self.source_dir().join(CHANGES_DIR)
    }

    /// `<root>/<source>/.lock`
    pub fn lock_path(&self) -> PathBuf {
        self.source_dir().join(LOCK_FILE)
    }

    /// Directory of one frame
    pub fn frame_dir(&self, frame: &TimeFrame) -> PathBuf {
        self.changes_dir().join(frame.key())
    }

    /// Artifact path of change `number` inside `dir`
    pub fn artifact_path(dir: &Path, number: u64) -> PathBuf {
        dir.join(format!("{number}.json"))
    }

    /// Create the directory of every frame that does not exist yet
    ///
    /// Returns how many directories were created.
    pub fn ensure_frame_dirs(&self, frames: &[TimeFrame]) -> OutputResult<usize> {
        let mut created = 0;
        for frame in frames {
            let dir = self.frame_dir(frame);
            if dir.is_dir() {
                continue;
            }
            std::fs::create_dir_all(&dir).map_err(|e| {
                OutputError::IoError(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            created += 1;
        }
        debug!(created, total = frames.len(), "Frame directories ensured");
        Ok(created)
    }

    /// Every frame directory on disk, sorted by start
    ///
    /// Entries whose name is not a frame key are skipped. A missing `changes`
    /// directory yields an empty list.
    pub fn existing_frames(&self, step: Duration) -> OutputResult<Vec<(TimeFrame, PathBuf)>> {
        let changes_dir = self.changes_dir();
        let entries = match std::fs::read_dir(&changes_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(OutputError::IoError(format!(
                    "Failed to read {}: {}",
                    changes_dir.display(),
                    e
                )))
            }
        };

        let mut frames = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                OutputError::IoError(format!("Failed to read directory entry: {e}"))
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(|key| TimeFrame::parse_key(key, step)) {
                Some(frame) => frames.push((frame, path)),
                None => warn!("Ignoring unexpected directory {}", path.display()),
            }
        }

        frames.sort_by_key(|(frame, _)| *frame);
        Ok(frames)
    }
}

/// Make a source name safe as one path component
///
/// `/`, `\`, `:` become `_` and `..` becomes `__`; an empty name becomes `_`.
fn sanitize_source(name: &str) -> String {
    let sanitized = name.replace("..", "__").replace(['/', '\\', ':'], "_");
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}
