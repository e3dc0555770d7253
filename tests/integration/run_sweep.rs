//! End-to-end sweeps over a scripted change source

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gerrit_changes_downloader::downloader::{ChangeDownloader, DownloadError, HarvestConfig};
use gerrit_changes_downloader::fetcher::{ArtifactOutcome, ChangeSource};
use gerrit_changes_downloader::output::{write_artifact, ChangesLayout, OutputError, SourceLock};
use gerrit_changes_downloader::shutdown::ShutdownSignal;
use gerrit_changes_downloader::{ChangeDetail, ChangeSummary};
use serde_json::Map;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Change source answering from a fixed table keyed by frame start
#[derive(Default)]
struct ScriptedSource {
    frames: HashMap<DateTime<Utc>, Vec<(&'static str, u64)>>,
    failing: Vec<u64>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl ScriptedSource {
    fn with_frame(mut self, start: DateTime<Utc>, changes: Vec<(&'static str, u64)>) -> Self {
        self.frames.insert(start, changes);
        self
    }

    fn failing(mut self, number: u64) -> Self {
        self.failing.push(number);
        self
    }

    fn change_id(&self, number: u64) -> &'static str {
        self.frames
            .values()
            .flatten()
            .find(|(_, n)| *n == number)
            .map(|(id, _)| *id)
            .unwrap_or("Iunknown")
    }
}

#[async_trait]
impl ChangeSource for ScriptedSource {
    async fn get_changes(
        &self,
        since: DateTime<Utc>,
        _until: Option<DateTime<Utc>>,
    ) -> Vec<ChangeSummary> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.frames
            .get(&since)
            .map(|changes| {
                changes
                    .iter()
                    .map(|(id, number)| ChangeSummary {
                        change_id: id.to_string(),
                        number: *number,
                        more_changes: false,
                        raw: Map::new(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn get_change(&self, number: u64, destination: &Path) -> ArtifactOutcome {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&number) {
            return ArtifactOutcome::Failed;
        }
        let detail = ChangeDetail {
            change_id: self.change_id(number).to_string(),
            number,
            fields: Map::new(),
        };
        match write_artifact(destination, number, &detail) {
            Ok(path) => ArtifactOutcome::Written(path),
            Err(OutputError::AlreadyExists(path)) => ArtifactOutcome::AlreadyExists(path),
            Err(_) => ArtifactOutcome::Failed,
        }
    }

    fn base_url(&self) -> &str {
        "https://gerrit-review.googlesource.com"
    }
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 6, d, 0, 0, 0).unwrap()
}

fn config(root: &Path) -> HarvestConfig {
    HarvestConfig::new(
        "gerrit",
        "https://gerrit-review.googlesource.com",
        day(1),
        day(3),
        root,
    )
}

fn two_day_source() -> ScriptedSource {
    ScriptedSource::default()
        .with_frame(day(1), vec![("Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c", 109611)])
        .with_frame(day(2), vec![("Ib051dd347eaea2c77ae6c403ebf76bed4b9b4b9c", 181990)])
}

#[tokio::test]
async fn test_run_writes_every_listed_change_into_its_frame() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(two_day_source());

    let summary = ChangeDownloader::with_source(config(temp.path()), source.clone())
        .run()
        .await
        .unwrap();

    let changes = temp.path().join("gerrit").join("changes");
    assert!(changes.join("2018-06-01").join("109611.json").exists());
    assert!(changes.join("2018-06-02").join("181990.json").exists());

    let stored: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(changes.join("2018-06-01").join("109611.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(stored["change_id"], "Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c");

    assert_eq!(summary.frames, 2);
    assert_eq!(summary.frames_created, 2);
    assert_eq!(summary.listed, 2);
    assert_eq!(summary.written, 2);
    assert_eq!(summary.failed, 0);
    assert!(!summary.interrupted);
    assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_second_run_fetches_nothing() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(two_day_source());
    let downloader = ChangeDownloader::with_source(config(temp.path()), source.clone());

    downloader.run().await.unwrap();
    let gets_after_first = source.get_calls.load(Ordering::SeqCst);
    assert_eq!(gets_after_first, 2);

    let summary = downloader.run().await.unwrap();
    assert_eq!(source.get_calls.load(Ordering::SeqCst), gets_after_first);
    assert_eq!(summary.frames_created, 0);
    assert_eq!(summary.written, 0);
    assert_eq!(summary.already_present, 2);
}

#[tokio::test]
async fn test_partially_fetched_frame_only_fetches_missing() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(
        ScriptedSource::default().with_frame(day(1), vec![("Ia", 1), ("Ib", 2), ("Ic", 3)]),
    );
    let cfg = HarvestConfig::new(
        "gerrit",
        "https://gerrit-review.googlesource.com",
        day(1),
        day(2),
        temp.path(),
    );

    let frame_dir = ChangesLayout::new(temp.path(), "gerrit")
        .changes_dir()
        .join("2018-06-01");
    std::fs::create_dir_all(&frame_dir).unwrap();
    write_artifact(
        &frame_dir,
        2,
        &ChangeDetail {
            change_id: "Ib".to_string(),
            number: 2,
            fields: Map::new(),
        },
    )
    .unwrap();

    let summary = ChangeDownloader::with_source(cfg, source.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(source.get_calls.load(Ordering::SeqCst), 2);
    assert_eq!(summary.written, 2);
    assert_eq!(summary.already_present, 1);
    assert!(frame_dir.join("1.json").exists());
    assert!(frame_dir.join("3.json").exists());
}

#[tokio::test]
async fn test_failed_change_does_not_stop_the_frame() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(
        ScriptedSource::default()
            .with_frame(day(1), vec![("Ia", 1), ("Ib", 2), ("Ic", 3)])
            .failing(2),
    );

    let summary = ChangeDownloader::with_source(config(temp.path()), source.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.failed, 1);

    let frame_dir = temp.path().join("gerrit/changes/2018-06-01");
    assert!(!frame_dir.join("2.json").exists());
}

#[tokio::test]
async fn test_frames_from_earlier_spans_are_revisited() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(
        two_day_source().with_frame(day(10), vec![("Ilater", 250000)]),
    );

    let earlier = ChangesLayout::new(temp.path(), "gerrit")
        .changes_dir()
        .join("2018-06-10");
    std::fs::create_dir_all(&earlier).unwrap();

    let summary = ChangeDownloader::with_source(config(temp.path()), source)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.frames, 3);
    assert!(earlier.join("250000.json").exists());
}

#[tokio::test]
async fn test_concurrent_frames_produce_same_tree() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(two_day_source());

    let summary = ChangeDownloader::with_source(config(temp.path()).with_concurrency(4), source)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.written, 2);
    assert!(temp.path().join("gerrit/changes/2018-06-02/181990.json").exists());
}

#[tokio::test]
async fn test_triggered_shutdown_fetches_nothing() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(two_day_source());
    let shutdown = ShutdownSignal::shared();
    shutdown.trigger();

    let summary = ChangeDownloader::with_source(config(temp.path()), source.clone())
        .with_shutdown(shutdown)
        .run()
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.written, 0);
    assert_eq!(source.get_calls.load(Ordering::SeqCst), 0);
    // Frame directories still exist so the next run can resume
    assert!(temp.path().join("gerrit/changes/2018-06-01").is_dir());
}

#[tokio::test]
async fn test_held_source_lock_refuses_second_run() {
    let temp = TempDir::new().unwrap();
    let layout = ChangesLayout::new(temp.path(), "gerrit");
    let mut lock = SourceLock::open(&layout.lock_path()).unwrap();
    let _guard = lock.try_acquire().unwrap();

    let source = Arc::new(two_day_source());
    let result = ChangeDownloader::with_source(config(temp.path()), source.clone())
        .run()
        .await;

    assert!(matches!(
        result,
        Err(DownloadError::OutputError(OutputError::LockError(_)))
    ));
    assert_eq!(source.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_progress_bar_is_finished_after_sweep() {
    let temp = TempDir::new().unwrap();
    let progress = indicatif::ProgressBar::hidden();

    ChangeDownloader::with_source(config(temp.path()), Arc::new(two_day_source()))
        .with_progress(progress.clone())
        .run()
        .await
        .unwrap();

    assert!(progress.is_finished());
    assert_eq!(progress.position(), 2);
}
