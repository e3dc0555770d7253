//! Failure classification for Gerrit requests.
//!
//! [`handle_exception`] is called from every failure path. It emits exactly one
//! error record tagged with the caller's context label and tells the caller what
//! to do next through a [`Disposition`]. It never panics, so retry loops can call
//! it unconditionally.

use tracing::error;

use super::FetcherError;
use crate::downloader::backoff::is_backoff_status;

/// Category of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError(u16),
    /// Any other non-success status
    ClientError(u16),
    /// No response at all
    NoResponse,
    /// Body was not parseable
    DecodeError,
    /// Anything else
    Unknown,
}

impl FailureKind {
    /// Classify a fetcher error
    pub fn of(err: &FetcherError) -> Self {
        match err {
            FetcherError::Status { status: 429, .. } => Self::RateLimited,
            FetcherError::Status { status, .. } if is_backoff_status(*status) => {
                Self::ServerError(*status)
            }
            FetcherError::Status { status: 0, .. } => Self::NoResponse,
            FetcherError::Status { status, .. } => Self::ClientError(*status),
            FetcherError::NoResponse(_) => Self::NoResponse,
            FetcherError::Decode(_) => Self::DecodeError,
            FetcherError::Output(_) | FetcherError::NetworkError(_) => Self::Unknown,
        }
    }

    /// Short tag used in log records
    pub fn description(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::ClientError(code) => match code {
                401 | 403 => "authentication failed",
                404 => "not found",
                _ => "client error",
            },
            Self::NoResponse => "no response",
            Self::DecodeError => "decode error",
            Self::Unknown => "unexpected error",
        }
    }

    /// Whether retrying the same request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError(_) | Self::NoResponse
        )
    }
}

/// What the caller should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Back off on `status`, then retry
    Backoff {
        /// Status code to hand to the backoff controller
        status: u16,
    },
    /// Retry without waiting (subject to the no-response bound)
    RetryImmediately,
    /// Give up on this request
    Abandon,
}

/// Log one failure and decide how to continue
///
/// # Arguments
/// * `err` - The failure
/// * `context` - Label of the logical request (e.g. "change 42")
pub fn handle_exception(err: &FetcherError, context: &str) -> Disposition {
    let kind = FailureKind::of(err);
    match kind {
        FailureKind::RateLimited | FailureKind::ServerError(_) => {
            let status = err.status().unwrap_or(429);
            error!(
                context = %context,
                status = status,
                kind = kind.description(),
                "Request failed: {}",
                err
            );
            Disposition::Backoff { status }
        }
        FailureKind::ClientError(status) => {
            error!(
                context = %context,
                status = status,
                kind = kind.description(),
                "Request rejected: {}",
                err
            );
            Disposition::Abandon
        }
        FailureKind::NoResponse => {
            error!(
                context = %context,
                kind = kind.description(),
                "No response from server: {}",
                err
            );
            Disposition::RetryImmediately
        }
        FailureKind::DecodeError => {
            error!(
                context = %context,
                kind = kind.description(),
                "Could not decode response: {}",
                err
            );
            Disposition::Abandon
        }
        FailureKind::Unknown => {
            error!(
                context = %context,
                kind = kind.description(),
                "Request failed: {}",
                err
            );
            Disposition::Abandon
        }
    }
}
