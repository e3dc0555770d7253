//! Advisory lock on a source directory
//!
//! Two processes sweeping the same `<root>/<source>` tree would race on the
//! same frames. The driver holds an exclusive fd-lock on `<source>/.lock`
//! for the whole run.

use super::{OutputError, OutputResult};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Lock file handle for one source directory
pub struct SourceLock {
    lock: RwLock<File>,
}

impl SourceLock {
    /// Open (creating if needed) the lock file at `path`
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::IoError(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| OutputError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            lock: RwLock::new(file),
        })
    }

    /// Take the exclusive lock without blocking
    ///
    /// The lock is held until the returned guard is dropped.
    pub fn try_acquire(&mut self) -> OutputResult<RwLockWriteGuard<'_, File>> {
        self.lock.try_write().map_err(|e| {
            OutputError::LockError(format!(
                "Another run holds the source lock ({e})"
            ))
        })
    }
}
