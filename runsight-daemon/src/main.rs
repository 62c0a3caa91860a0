use anyhow::Result;
use clap::Parser;

use runsight_daemon::cli::DaemonCli;
use runsight_daemon::logging;
use runsight_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();
    let config = cli.load_config().await?;

    if cli.validate {
        println!("configuration is valid");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "runsight-daemon starting");

    let orchestrator = Orchestrator::build(config).await?;
    orchestrator.run().await?;

    tracing::info!("runsight-daemon shut down");
    Ok(())
}
