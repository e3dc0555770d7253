//! `frames` command: print the partition of a span

use crate::create_time_frames;
use crate::downloader::config::DEFAULT_FRAME_HOURS;
use crate::TimeFrame;
use clap::Parser;

use super::run::{parse_span, OutputFormat};
use super::CliError;

/// Arguments for the `frames` command
#[derive(Parser, Debug)]
pub struct FramesArgs {
    /// Start of the span (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub start: String,

    /// Exclusive end of the span (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub end: String,

    /// Frame width in hours
    #[arg(
        long,
        default_value_t = DEFAULT_FRAME_HOURS,
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    pub frame_hours: i64,
}

impl FramesArgs {
    /// Compute the frames without printing them
    pub fn frames(&self) -> Result<Vec<TimeFrame>, CliError> {
        let (start, end) = parse_span(&self.start, &self.end)?;
        Ok(create_time_frames(
            start,
            end,
            chrono::Duration::hours(self.frame_hours),
        ))
    }

    /// Print the frames in the requested format
    pub fn execute(&self, format: OutputFormat) -> Result<(), CliError> {
        let frames = self.frames()?;
        match format {
            OutputFormat::Json => {
                let rows: Vec<serde_json::Value> = frames
                    .iter()
                    .map(|frame| {
                        serde_json::json!({
                            "key": frame.key(),
                            "start": frame.start(),
                            "end": frame.end(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::Value::Array(rows));
            }
            OutputFormat::Human => {
                for frame in &frames {
                    println!("{}  {}", frame.key(), frame);
                }
                println!("{} frame(s)", frames.len());
            }
        }
        Ok(())
    }
}
