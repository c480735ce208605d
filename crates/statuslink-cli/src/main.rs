//! StatusLink probe entry point

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use statuslink_cli::{cli::Cli, config::ProbeConfig, probe};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let mut config =
        ProbeConfig::load(cli.config.as_deref()).context("Failed to load probe configuration")?;
    config.apply_cli(&cli);

    let outgoing = cli
        .send
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--send must be valid JSON")?;

    match probe::run(config, outgoing).await {
        Ok(summary) => {
            info!(
                connected = summary.connected,
                messages = summary.messages,
                dropped = summary.dropped_frames,
                "Probe finished"
            );
            Ok(())
        }
        Err(e) => {
            error!("Probe failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
