//! Download configuration constants and run parameters

use chrono::{DateTime, Duration as FrameStep, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum number of attempts for one request (initial attempt + 5 retries).
/// Bounds the retry loop so a server that keeps failing cannot livelock a sweep
/// (max total backoff with the defaults below is ~1 minute per request).
pub const MAX_ATTEMPTS: u32 = 6;

/// Immediate retries allowed after a request got no response at all
/// (connection reset, DNS failure, timeout). No backoff is applied to these.
pub const MAX_NO_RESPONSE_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
/// Escalation 5 = 32s, capped to 30s.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Default width of one time frame (one directory per day)
pub const DEFAULT_FRAME_HOURS: i64 = 24;

/// Number of changes requested per list page (`n=` parameter)
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// `initial * 2^escalation`, capped at `max`
pub(crate) fn backoff_between(initial: Duration, max: Duration, escalation: u32) -> Duration {
    let factor = 2u32.checked_pow(escalation).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

/// Bounds for one retry episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one
    pub max_attempts: u32,
    /// Immediate retries allowed for failures without a response
    pub max_no_response_retries: u32,
    /// First backoff delay
    pub initial_backoff: Duration,
    /// Backoff cap
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            max_no_response_retries: MAX_NO_RESPONSE_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Set total attempts (at least 1)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set immediate retries on missing responses
    pub fn with_max_no_response_retries(mut self, retries: u32) -> Self {
        self.max_no_response_retries = retries;
        self
    }

    /// Set backoff bounds
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }
}

/// Parameters of one harvest run
///
/// The five constructor arguments are required; everything else has a default
/// and a `with_*` setter.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Name of the tracked source; becomes the top-level directory
    pub source_name: String,
    /// Gerrit base URL (e.g. `https://gerrit-review.googlesource.com`)
    pub base_url: String,
    /// Start of the tracked span
    pub start: DateTime<Utc>,
    /// Exclusive end of the tracked span
    pub end: DateTime<Utc>,
    /// Root output directory
    pub root_dir: PathBuf,
    /// Width of one time frame
    pub frame_step: FrameStep,
    /// Retry bounds for every request
    pub retry: RetryPolicy,
    /// Changes per list page
    pub page_size: usize,
    /// Frames processed concurrently
    pub concurrency: usize,
}

impl HarvestConfig {
    /// Create a configuration with default frame width, retry policy and concurrency
    pub fn new(
        source_name: impl Into<String>,
        base_url: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        root_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            start,
            end,
            root_dir: root_dir.into(),
            frame_step: FrameStep::hours(DEFAULT_FRAME_HOURS),
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: 1,
        }
    }

    /// Set the frame width
    pub fn with_frame_step(mut self, step: FrameStep) -> Self {
        self.frame_step = step;
        self
    }

    /// Set the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the list page size (at least 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set how many frames are processed at once (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}
