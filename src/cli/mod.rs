//! CLI command implementations

pub mod error;
pub mod frames;
pub mod run;

pub use error::CliError;
pub use frames::FramesArgs;
pub use run::{Cli, Commands, OutputFormat, RunArgs};
