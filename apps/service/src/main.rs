use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;
use uppe_service::Orchestrator;
use uppe_service::config::Config;

#[derive(Debug, Parser)]
#[command(version, about = "Uppe monitoring engine")]
struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/uppe/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the monitoring engine (default)
    Run,
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::ShowConfig => {
            println!("{config}");
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: Config) -> Result<()> {
    config.logging.init();
    info!("Starting uppe-service v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = Orchestrator::from_config(config).await?;

    // Monitor changes arrive through reconciliation only; nothing else feeds events here.
    let (_events_tx, events_rx) = mpsc::channel(64);
    orchestrator
        .run(events_rx, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
