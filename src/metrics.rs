//! Observability metrics for change downloads
//!
//! Counters and histograms are emitted through the `metrics` facade and are
//! no-ops until [`init_metrics`] installs the Prometheus exporter.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Install the Prometheus exporter on `addr`
///
/// Idempotent: later calls return `Ok` without rebinding.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INITIALIZED.get().is_some() {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "gerrit_http_requests_total",
        Unit::Count,
        "HTTP requests sent to the Gerrit API, labelled by endpoint and status"
    );
    describe_histogram!(
        "gerrit_http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "gerrit_http_retries_total",
        Unit::Count,
        "Backoff waits performed before a retry"
    );
    describe_histogram!(
        "gerrit_retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!(
        "gerrit_artifacts_total",
        Unit::Count,
        "Change artifacts by outcome (written, skipped, failed)"
    );
    describe_counter!(
        "gerrit_frames_completed_total",
        Unit::Count,
        "Time frames fully processed"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Times one HTTP request
pub struct RequestTimer {
    endpoint: &'static str,
    started: Instant,
}

impl RequestTimer {
    /// Start timing a request against `endpoint` ("list" or "detail")
    pub fn start(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            started: Instant::now(),
        }
    }

    /// Record a response with the given status code
    pub fn record_status(&self, status: u16) {
        self.record(status.to_string());
    }

    /// Record a request that never produced a response
    pub fn record_no_response(&self) {
        self.record("no_response".to_string());
    }

    fn record(&self, status: String) {
        counter!(
            "gerrit_http_requests_total",
            "endpoint" => self.endpoint,
            "status" => status,
        )
        .increment(1);
        histogram!(
            "gerrit_http_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(self.started.elapsed().as_secs_f64());
    }
}

/// Record a backoff wait
pub fn record_retry_backoff(duration: Duration, escalation: u32) {
    counter!("gerrit_http_retries_total").increment(1);
    histogram!(
        "gerrit_retry_backoff_duration_seconds",
        "escalation" => escalation.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Artifact outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactEvent {
    /// A new artifact was written
    Written,
    /// The artifact already existed on disk
    Skipped,
    /// Fetching or writing failed
    Failed,
}

impl ArtifactEvent {
    fn label(self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Count artifacts by outcome
pub fn record_artifacts(event: ArtifactEvent, count: u64) {
    if count > 0 {
        counter!("gerrit_artifacts_total", "outcome" => event.label()).increment(count);
    }
}

/// Count a fully processed frame
pub fn record_frame_complete() {
    counter!("gerrit_frames_completed_total").increment(1);
}
