//! Sweep driver
//!
//! [`ChangeDownloader::run`] ensures a directory per frame, then walks every
//! frame directory on disk, lists the changes touched in that frame and fetches
//! the ones whose artifact is missing. Re-running after an interruption only
//! fetches what is still missing.

use crate::downloader::config::HarvestConfig;
use crate::downloader::DownloadError;
use crate::fetcher::{ArtifactOutcome, ChangeSource, GerritFetcher};
use crate::metrics::{self, ArtifactEvent};
use crate::output::{existing_artifacts, ChangesLayout, SourceLock};
use crate::shutdown::SharedShutdown;
use crate::{create_time_frames, TimeFrame};
use chrono::{Duration, Timelike};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Totals of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Frame directories processed
    pub frames: usize,
    /// Frame directories created by this run
    pub frames_created: usize,
    /// Distinct changes listed across all frames
    pub listed: usize,
    /// Artifacts written
    pub written: usize,
    /// Listed changes whose artifact was already on disk
    pub already_present: usize,
    /// Changes that could not be fetched or written
    pub failed: usize,
    /// Whether the run stopped early on a shutdown request
    pub interrupted: bool,
}

impl RunSummary {
    fn absorb(&mut self, frame: FrameSummary) {
        self.frames += 1;
        self.listed += frame.listed;
        self.written += frame.written;
        self.already_present += frame.already_present;
        self.failed += frame.failed;
        self.interrupted |= frame.interrupted;
    }
}

#[derive(Debug, Default)]
struct FrameSummary {
    listed: usize,
    written: usize,
    already_present: usize,
    failed: usize,
    interrupted: bool,
}

/// Orchestrates one sweep over a source
pub struct ChangeDownloader {
    config: HarvestConfig,
    source: Arc<dyn ChangeSource>,
    layout: ChangesLayout,
    shutdown: Option<SharedShutdown>,
    progress: Option<ProgressBar>,
}

impl ChangeDownloader {
    /// Create a downloader talking to the Gerrit API named in `config`
    pub fn from_config(config: HarvestConfig) -> Self {
        let source = GerritFetcher::new(config.base_url.clone())
            .with_retry_policy(config.retry)
            .with_page_size(config.page_size)
            .shared();
        Self::with_source(config, source)
    }

    /// Create a downloader over any change source
    pub fn with_source(config: HarvestConfig, source: Arc<dyn ChangeSource>) -> Self {
        let layout = ChangesLayout::new(config.root_dir.clone(), &config.source_name);
        Self {
            config,
            source,
            layout,
            shutdown: None,
            progress: None,
        }
    }

    /// Attach a shutdown signal checked before every detail fetch
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Attach a progress bar advanced once per frame
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Directory layout used by this downloader
    pub fn layout(&self) -> &ChangesLayout {
        &self.layout
    }

    /// Frames of the configured span
    pub fn frames(&self) -> Vec<TimeFrame> {
        create_time_frames(self.config.start, self.config.end, self.config.frame_step)
    }

    /// Run the sweep
    ///
    /// # Errors
    /// Only setup failures: invalid frame width or start, directories that
    /// cannot be created, or a source lock held by another run.
    pub async fn run(&self) -> Result<RunSummary, DownloadError> {
        self.validate()?;

        let mut lock = SourceLock::open(&self.layout.lock_path())?;
        let _guard = lock.try_acquire()?;

        let frames = self.frames();
        let frames_created = self.layout.ensure_frame_dirs(&frames)?;
        let existing = self.layout.existing_frames(self.config.frame_step)?;

        info!(
            source = %self.config.source_name,
            base_url = %self.source.base_url(),
            frames = existing.len(),
            created = frames_created,
            concurrency = self.config.concurrency,
            "Starting change sweep"
        );

        if let Some(progress) = &self.progress {
            progress.set_length(existing.len() as u64);
        }

        let results: Vec<FrameSummary> = stream::iter(existing)
            .map(|(frame, dir)| self.process_frame(frame, dir))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        let mut summary = RunSummary {
            frames_created,
            ..RunSummary::default()
        };
        for frame in results {
            summary.absorb(frame);
        }

        info!(
            frames = summary.frames,
            listed = summary.listed,
            written = summary.written,
            already_present = summary.already_present,
            failed = summary.failed,
            interrupted = summary.interrupted,
            "Change sweep finished"
        );
        Ok(summary)
    }

    /// Frame directory keys have one-second resolution, so the width and the
    /// start must both be whole seconds for every frame to get its own directory
    fn validate(&self) -> Result<(), DownloadError> {
        let step = self.config.frame_step;
        if step <= Duration::zero() {
            return Err(DownloadError::ConfigurationError(format!(
                "frame width must be positive, got {step}"
            )));
        }
        if step.subsec_nanos() != 0 {
            return Err(DownloadError::ConfigurationError(format!(
                "frame width must be a whole number of seconds, got {step}"
            )));
        }
        if self.config.start.nanosecond() != 0 {
            return Err(DownloadError::ConfigurationError(format!(
                "span start must be a whole second, got {}",
                self.config.start
            )));
        }
        Ok(())
    }

    /// Clamp a frame rebuilt from a directory name to the configured end
    fn clamp(&self, frame: TimeFrame) -> TimeFrame {
        TimeFrame::new(frame.start(), frame.end().min(self.config.end)).unwrap_or(frame)
    }

    async fn process_frame(&self, frame: TimeFrame, dir: PathBuf) -> FrameSummary {
        let frame = self.clamp(frame);
        let mut summary = FrameSummary::default();

        if self.is_shutdown() {
            summary.interrupted = true;
            return summary;
        }

        let present = match existing_artifacts(&dir) {
            Ok(present) => present,
            Err(e) => {
                error!(frame = %frame.key(), "Skipping frame: {}", e);
                self.advance_progress(&frame);
                return summary;
            }
        };

        let changes = self.source.get_frame_changes(&frame).await;
        let numbers: BTreeSet<u64> = changes.iter().map(|change| change.number).collect();
        summary.listed = numbers.len();

        let missing: Vec<u64> = numbers.difference(&present).copied().collect();
        summary.already_present = numbers.len() - missing.len();

        debug!(
            frame = %frame.key(),
            listed = summary.listed,
            missing = missing.len(),
            "Frame listed"
        );

        for number in missing {
            if self.is_shutdown() {
                warn!(frame = %frame.key(), "Shutdown requested, leaving frame incomplete");
                summary.interrupted = true;
                break;
            }

            match self.source.get_change(number, &dir).await {
                ArtifactOutcome::Written(_) => summary.written += 1,
                ArtifactOutcome::AlreadyExists(_) => summary.already_present += 1,
                ArtifactOutcome::Failed => summary.failed += 1,
            }
        }

        metrics::record_artifacts(ArtifactEvent::Written, summary.written as u64);
        metrics::record_artifacts(ArtifactEvent::Skipped, summary.already_present as u64);
        metrics::record_artifacts(ArtifactEvent::Failed, summary.failed as u64);
        if !summary.interrupted {
            metrics::record_frame_complete();
        }

        info!(
            frame = %frame.key(),
            listed = summary.listed,
            written = summary.written,
            failed = summary.failed,
            "Frame processed"
        );
        self.advance_progress(&frame);
        summary
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|shutdown| shutdown.is_triggered())
    }

    fn advance_progress(&self, frame: &TimeFrame) {
        if let Some(progress) = &self.progress {
            progress.set_message(frame.key());
            progress.inc(1);
        }
    }
}
