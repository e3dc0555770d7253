//! Sweep orchestration, backoff and configuration
//!
//! The downloader turns a [`HarvestConfig`] into files on disk:
//!
//! 1. **Partition**: the span is split into frames with [`crate::create_time_frames`]
//! 2. **Layout**: one directory per frame is ensured under `<root>/<source>/changes`
//! 3. **Sweep**: [`ChangeDownloader::run`] lists each frame's changes and fetches
//!    the ones missing on disk
//! 4. **Backoff**: rejected requests wait through [`backoff::Backoff`]
//!
//! # Quick Start
//!
//! ```no_run
//! use gerrit_changes_downloader::downloader::{ChangeDownloader, HarvestConfig};
//! use chrono::{TimeZone, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::new(
//!     "gerrit",
//!     "https://gerrit-review.googlesource.com",
//!     Utc.with_ymd_and_hms(2018, 6, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2018, 6, 2, 0, 0, 0).unwrap(),
//!     "./gerry_data",
//! )
//! .with_concurrency(2);
//!
//! let summary = ChangeDownloader::from_config(config).run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Request failures are absorbed by the fetcher and only show up as
//! [`RunSummary::failed`]. `run` returns a [`DownloadError`] only for setup
//! problems: directories that cannot be created or a source lock held by
//! another process.

pub mod backoff;
pub mod config;
pub mod executor;

pub use backoff::Backoff;
pub use config::{HarvestConfig, RetryPolicy};
pub use executor::{ChangeDownloader, RunSummary};

use crate::output::OutputError;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Output setup failed (directories, lock)
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Configuration rejected before any request was made
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
