//! Main entry point for the gerrit-changes-downloader CLI

use clap::Parser;
use gerrit_changes_downloader::cli::{Cli, Commands};
use gerrit_changes_downloader::metrics;
use gerrit_changes_downloader::shutdown::{self, ShutdownSignal};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gerrit_changes_downloader=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownSignal::shared();
    shutdown::install_ctrl_c_handler(shutdown.clone());

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = metrics::init_metrics(addr) {
            error!("Failed to start metrics exporter on {}: {}", addr, e);
            std::process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Run(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Frames(ref args) => args
            .execute(cli.output_format)
            .map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
