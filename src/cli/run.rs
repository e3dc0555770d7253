//! `run` command and top-level CLI definition

use crate::downloader::config::{MAX_ATTEMPTS, MAX_NO_RESPONSE_RETRIES};
use crate::downloader::{ChangeDownloader, HarvestConfig, RetryPolicy, RunSummary};
use crate::shutdown::SharedShutdown;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{error, info};

use super::{CliError, FramesArgs};

/// Maximum allowed concurrency to keep the server from rate limiting us
const MAX_CONCURRENCY: usize = 32;

/// Try to parse a datetime in RFC3339 format
///
/// Inputs without a timezone designator are taken as UTC:
/// - "2018-06-01T00:00:00Z"
/// - "2018-06-01T00:00:00+01:00"
/// - "2018-06-01T00:00:00"
fn try_parse_datetime_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// Parse a span boundary from YYYY-MM-DD or RFC3339 datetime format.
///
/// A bare date means midnight UTC. Span ends are exclusive, so
/// `--start 2018-06-01 --end 2018-06-02` covers exactly one day.
pub fn parse_datetime_flexible(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }

    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid date '{input}': {e}")))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid date '{input}'")))?;
    Ok(datetime.and_utc())
}

/// Parse both span boundaries and require `start < end`
pub fn parse_span(start: &str, end: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), CliError> {
    let start = parse_datetime_flexible(start)?;
    let end = parse_datetime_flexible(end)?;
    if start >= end {
        return Err(CliError::InvalidArgument(format!(
            "start ({start}) must be before end ({end})"
        )));
    }
    Ok((start, end))
}

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Gerrit changes downloader CLI
#[derive(Parser, Debug)]
#[command(name = "gerrit-changes-downloader")]
#[command(about = "Download Gerrit code-review changes into per-frame JSON files", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Number of frames processed at once (default: 1, max: 32)
    #[arg(long, global = true, default_value = "1", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Retries after the first attempt of a request (range: 0-20)
    #[arg(
        long,
        global = true,
        default_value_t = MAX_ATTEMPTS - 1,
        value_parser = clap::value_parser!(u32).range(0..=20)
    )]
    pub max_retries: u32,

    /// Immediate retries when the server does not answer at all
    #[arg(
        long,
        global = true,
        default_value_t = MAX_NO_RESPONSE_RETRIES,
        value_parser = clap::value_parser!(u32).range(0..=20)
    )]
    pub max_no_response_retries: u32,

    /// Expose Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Retry policy described by the global flags
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_retries + 1)
            .with_max_no_response_retries(self.max_no_response_retries)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every change touched in a date span
    Run(RunArgs),

    /// Print the frames a span is split into, without any request
    Frames(FramesArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Name of the tracked source; becomes the top-level output directory
    #[arg(long)]
    pub name: String,

    /// Gerrit base URL (e.g. https://gerrit-review.googlesource.com)
    #[arg(long)]
    pub url: String,

    /// Start of the span (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub start: String,

    /// Exclusive end of the span (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub end: String,

    /// Root output directory
    #[arg(long)]
    pub directory: PathBuf,

    /// Frame width in hours
    #[arg(
        long,
        default_value_t = crate::downloader::config::DEFAULT_FRAME_HOURS,
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    pub frame_hours: i64,
}

impl RunArgs {
    /// Build the harvest configuration for this invocation
    pub fn to_config(&self, cli: &Cli) -> Result<HarvestConfig, CliError> {
        let (start, end) = parse_span(&self.start, &self.end)?;
        if self.name.trim().is_empty() {
            return Err(CliError::InvalidArgument(
                "source name must not be empty".to_string(),
            ));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(CliError::InvalidArgument(format!(
                "URL must start with http:// or https://, got '{}'",
                self.url
            )));
        }

        Ok(
            HarvestConfig::new(&self.name, &self.url, start, end, &self.directory)
                .with_frame_step(chrono::Duration::hours(self.frame_hours))
                .with_retry_policy(cli.retry_policy())
                .with_concurrency(cli.concurrency),
        )
    }

    /// Execute the sweep
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = self.to_config(cli)?;
        info!(
            name = %config.source_name,
            url = %config.base_url,
            start = %config.start,
            end = %config.end,
            "Starting run"
        );

        let mut downloader = ChangeDownloader::from_config(config).with_shutdown(shutdown);
        if matches!(cli.output_format, OutputFormat::Human) {
            downloader = downloader.with_progress(create_progress_bar(&self.name));
        }

        let result = downloader.run().await;
        match cli.output_format {
            OutputFormat::Json => output_json(self, &result),
            OutputFormat::Human => output_human(self, &result),
        }
        result.map(|_| ()).map_err(CliError::from)
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

fn output_json(args: &RunArgs, result: &Result<RunSummary, crate::downloader::DownloadError>) {
    let (success, summary, err) = match result {
        Ok(summary) => (true, Some(summary), None),
        Err(e) => (false, None, Some(e.to_string())),
    };

    let output = serde_json::json!({
        "success": success,
        "name": args.name,
        "url": args.url,
        "start": args.start,
        "end": args.end,
        "directory": args.directory.display().to_string(),
        "summary": summary,
        "error": err,
    });
    println!("{output}");
}

fn output_human(args: &RunArgs, result: &Result<RunSummary, crate::downloader::DownloadError>) {
    match result {
        Ok(summary) => {
            if summary.interrupted {
                println!("\nRun interrupted; re-run the same command to resume.");
            } else {
                println!("\nRun completed successfully!");
            }
            println!("Source: {} ({})", args.name, args.url);
            println!("Output: {}", args.directory.display());
            println!(
                "Frames: {} ({} created)",
                summary.frames, summary.frames_created
            );
            println!("Changes listed: {}", summary.listed);
            println!("Changes written: {}", summary.written);
            println!("Already on disk: {}", summary.already_present);
            if summary.failed > 0 {
                println!("Failed: {}", summary.failed);
            }
        }
        Err(e) => {
            eprintln!("\nRun failed!");
            eprintln!("Error: {e}");
            error!("Run failed: {}", e);
        }
    }
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}
