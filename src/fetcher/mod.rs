//! Gerrit API access
//!
//! - [`gerrit_http`] - single-attempt HTTP client that strips Gerrit's magic prefix
//! - [`classifier`] - maps a failure to a [`classifier::Disposition`] and logs it once
//! - [`retry`] - bounded retry episode combining classifier and backoff
//! - [`gerrit`] - the [`ChangeSource`] implementation used by the downloader

use crate::output::OutputError;
use crate::{ChangeSummary, TimeFrame};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub mod classifier;
pub mod gerrit;
pub mod gerrit_http;
pub mod retry;
pub mod shared_resources;

pub use gerrit::GerritFetcher;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// The server answered with a non-success status
    #[error("HTTP status {status}: {body}")]
    Status {
        /// Status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// No response was received (connect, DNS, timeout, reset)
    #[error("no response: {0}")]
    NoResponse(String),

    /// Response body was not the expected JSON
    #[error("decode error: {0}")]
    Decode(String),

    /// Writing the artifact failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Any other transport failure
    #[error("network error: {0}")]
    NetworkError(String),
}

impl FetcherError {
    /// Status code carried by the failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }

        if err.is_decode() {
            return Self::Decode(err.to_string());
        }

        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            return Self::NoResponse(err.to_string());
        }

        Self::NetworkError(err.to_string())
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// What happened to one requested artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// Fetched and written to the given path
    Written(PathBuf),
    /// Already present on disk; nothing was written
    AlreadyExists(PathBuf),
    /// Fetching or writing failed; the failure has been logged
    Failed,
}

/// Source of change records
///
/// Implementations absorb every request failure: listing returns whatever was
/// gathered before giving up, and detail fetches report [`ArtifactOutcome::Failed`].
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// List changes updated at or after `since` (and before `until`, if given)
    ///
    /// Follows server-side continuation until exhausted. Returns an empty
    /// vector when nothing matches.
    async fn get_changes(
        &self,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Vec<ChangeSummary>;

    /// Fetch the detail of change `number` and write it as `<destination>/<number>.json`
    async fn get_change(&self, number: u64, destination: &Path) -> ArtifactOutcome;

    /// List the changes updated within a frame
    async fn get_frame_changes(&self, frame: &TimeFrame) -> Vec<ChangeSummary> {
        self.get_changes(frame.start(), Some(frame.end())).await
    }

    /// Base URL of the API
    fn base_url(&self) -> &str;
}
