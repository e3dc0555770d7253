//! Time frame partitioning
//!
//! Splits an overall date span into consecutive fixed-width frames. Each frame
//! is one query window and one directory on disk, so a sweep can stop and
//! resume at frame granularity.
//!
//! ```rust
//! use gerrit_changes_downloader::create_time_frames;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
//! let end = Utc.with_ymd_and_hms(2017, 1, 2, 0, 0, 0).unwrap();
//! let frames = create_time_frames(start, end, Duration::hours(1));
//! assert_eq!(frames.len(), 24);
//! ```

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

/// Directory key format for frames starting at midnight
const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Directory key format for frames starting mid-day
const DATETIME_KEY_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Gerrit query timestamp format
const GERRIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Half-open interval `[start, end)` bounding one query and one directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeFrame {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeFrame {
    /// Create a frame, or `None` unless `start < end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Inclusive start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Width of the frame
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Directory key for this frame, derived from its start
    ///
    /// Frames that start at midnight UTC use the plain date (`2018-06-01`);
    /// others carry the time as well (`2018-06-01T13-00-00`) so hourly frames
    /// of one day never share a directory.
    pub fn key(&self) -> String {
        let time = self.start.time();
        if time.hour() == 0 && time.minute() == 0 && time.second() == 0 {
            self.start.format(DATE_KEY_FORMAT).to_string()
        } else {
            self.start.format(DATETIME_KEY_FORMAT).to_string()
        }
    }

    /// Rebuild a frame from a directory key produced by [`TimeFrame::key`]
    ///
    /// The end is `start + step`; returns `None` for keys that are not frame
    /// directories or for a non-positive step.
    pub fn parse_key(key: &str, step: Duration) -> Option<Self> {
        let start = if let Ok(dt) = NaiveDateTime::parse_from_str(key, DATETIME_KEY_FORMAT) {
            dt.and_utc()
        } else {
            NaiveDate::parse_from_str(key, DATE_KEY_FORMAT)
                .ok()?
                .and_hms_opt(0, 0, 0)?
                .and_utc()
        };
        Self::new(start, start + step)
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to {}",
            format_gerrit_timestamp(self.start),
            format_gerrit_timestamp(self.end)
        )
    }
}

/// Split `[start, end)` into consecutive frames of width `step`
///
/// The last frame is shortened so it ends exactly at `end`. An empty span
/// (`start >= end`) or a non-positive step yields no frames.
pub fn create_time_frames(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
) -> Vec<TimeFrame> {
    let mut frames = Vec::new();
    if step <= Duration::zero() {
        return frames;
    }

    let mut current = start;
    while current < end {
        let next = (current + step).min(end);
        frames.push(TimeFrame {
            start: current,
            end: next,
        });
        current = next;
    }

    frames
}

/// Render a timestamp the way Gerrit's `after:`/`before:` operators expect
pub fn format_gerrit_timestamp(dt: DateTime<Utc>) -> String {
    dt.format(GERRIT_TIMESTAMP_FORMAT).to_string()
}
