use std::path::PathBuf;

use clap::Parser;

use telemetry_server::config::load_config;
use telemetry_server::lifecycle::{spawn_signal_handler, Shutdown};
use telemetry_server::observability::{logging::init_logging, metrics::init_metrics};
use telemetry_server::IngestServer;

#[derive(Parser)]
#[command(name = "telemetry-server")]
#[command(about = "Authenticated metric ingestion server", long_about = None)]
struct Cli {
    /// Server configuration file (TOML).
    #[arg(short, long, default_value = "telemetry.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_logging(&config.observability.log_level, config.observability.log_format);
    tracing::info!("telemetry-server v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        registry = %config.auth.registry_path.display(),
        log_directory = %config.log_writer.directory.display(),
        cache_ttl_secs = config.cache.ttl_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = IngestServer::new(config);
    if let Err(e) = server.run(shutdown).await {
        tracing::error!(error = %e, "Server failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
