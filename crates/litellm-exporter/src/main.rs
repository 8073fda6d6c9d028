//! LiteLLM Exporter Binary
//!
//! Polls the LiteLLM database and serves the results on `/metrics`.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use litellm_exporter::{app, config::ExporterConfig, telemetry, VERSION};
use litellm_exporter_collector::PgConnectionSource;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the configured level applies
    let config = ExporterConfig::load()?;
    telemetry::init(&config.logging);

    info!("Starting LiteLLM Exporter v{}", VERSION);
    info!("Loaded configuration: {:?}", config);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    // Only a failed pool is fatal from here on
    let source = PgConnectionSource::connect(&config.database).await?;
    let cycles = app::run(&config, source, cancel).await?;

    info!(cycles, "Shutdown complete");
    Ok(())
}

/// Cancel `cancel` on SIGINT or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    cancel.cancel();
}
