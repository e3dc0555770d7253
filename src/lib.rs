//! # Gerrit Changes Downloader Library
//!
//! Downloads code-review changes from a Gerrit-style REST API over a bounded
//! date range and stores every change as its own JSON file. Runs are resumable:
//! a change whose file already exists on disk is never fetched again.
//!
//! ## Features
//!
//! - **Time-frame partitioning**: the requested span is split into fixed-width
//!   frames, one directory each, so an interrupted sweep picks up where it stopped
//! - **Backoff and retry**: 429 and 5xx responses back off exponentially with a cap;
//!   every retry loop is bounded
//! - **Idempotent persistence**: atomic, no-clobber writes keyed by change number
//! - **Server continuation**: list queries follow Gerrit's `_more_changes` flag
//!
//! ## Quick Start
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
//! );
//!
//! let downloader = ChangeDownloader::from_config(config);
//! let summary = downloader.run().await?;
//! println!("wrote {} changes", summary.written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`timeframe`] - Splitting a date span into [`TimeFrame`]s
//! - [`fetcher`] - Gerrit HTTP client, error classification and retry episodes
//! - [`downloader`] - Backoff controller, configuration and the sweep driver
//! - [`output`] - Directory layout, artifact writes and the per-source lock
//! - [`cli`] - Command line interface

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CLI command implementations
pub mod cli;

/// Sweep orchestration, backoff and configuration
pub mod downloader;

/// Gerrit API access
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// On-disk layout and artifact persistence
pub mod output;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Time frame partitioning
pub mod timeframe;

pub use timeframe::{create_time_frames, format_gerrit_timestamp, TimeFrame};

/// One entry of a change list query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeSummary {
    /// Stable change id (e.g. "Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c")
    pub change_id: String,
    /// Numeric change number, used to name the artifact on disk
    #[serde(rename = "_number")]
    pub number: u64,
    /// Set by Gerrit on the last entry of a page when more results exist
    #[serde(rename = "_more_changes", default, skip_serializing_if = "is_false")]
    pub more_changes: bool,
    /// Remaining fields, kept opaque
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

/// Full detail of a single change, persisted as one artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeDetail {
    /// Stable change id
    pub change_id: String,
    /// Numeric change number
    #[serde(rename = "_number")]
    pub number: u64,
    /// Every other field returned by the server
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ChangeDetail {
    /// Validate detail integrity before it is written
    pub fn validate(&self) -> Result<(), String> {
        if self.change_id.is_empty() {
            return Err("change_id cannot be empty".to_string());
        }

        if self.number == 0 {
            return Err(format!(
                "change {} has no valid _number",
                self.change_id
            ));
        }

        Ok(())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
