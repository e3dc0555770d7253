//! CLI error types and conversions

use crate::downloader::DownloadError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Download error
    #[error("download error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
