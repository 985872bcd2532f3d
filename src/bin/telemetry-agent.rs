use std::path::PathBuf;

use clap::Parser;

use telemetry_server::agent::{Agent, CollectorRegistry};
use telemetry_server::config::{load_agent_config, LogFormat};
use telemetry_server::lifecycle::{spawn_signal_handler, Shutdown};
use telemetry_server::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "telemetry-agent")]
#[command(about = "Collect host metrics and push them to a telemetry server", long_about = None)]
struct Cli {
    /// Agent configuration file (TOML).
    #[arg(short, long, default_value = "agent.toml")]
    config: PathBuf,

    /// Push a single round and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_agent_config(&cli.config)?;
    init_logging(&config.log_level, LogFormat::Pretty);

    tracing::info!(
        server = %config.server_address,
        user_id = %config.user_id,
        interval_secs = config.interval_secs,
        "telemetry-agent v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let agent = Agent::new(config, CollectorRegistry::standard());
    if cli.once {
        let report = agent.push_once().await?;
        println!(
            "accepted={} rejected={} skipped={}",
            report.accepted, report.rejected, report.skipped
        );
        return Ok(());
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    agent.run(shutdown).await;
    Ok(())
}
