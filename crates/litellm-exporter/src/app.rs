//! Process body between pool creation and shutdown

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use litellm_exporter_collector::{
    AvailabilityGate, CollectionLoop, ExecutionPort, GatedCollector, MetricsEngine, PgConnectionSource,
    PrometheusSink,
};

use crate::config::ExporterConfig;
use crate::server;

/// Serve and collect until `cancel` fires, then close the pool
///
/// The pool is closed on every exit path, including a failed bind or a
/// server error. Returns the number of completed cycles.
pub async fn run(config: &ExporterConfig, source: PgConnectionSource, cancel: CancellationToken) -> Result<u64> {
    let outcome = serve_and_collect(config, &source, &cancel).await;
    cancel.cancel();
    source.close().await;
    outcome
}

async fn serve_and_collect(
    config: &ExporterConfig,
    source: &PgConnectionSource,
    cancel: &CancellationToken,
) -> Result<u64> {
    let port = Arc::new(ExecutionPort::new(source.clone(), config.retry_policy()));
    let sink = Arc::new(PrometheusSink::new()?);

    let listener = TcpListener::bind(config.listen_addr()?).await?;
    let server = tokio::spawn(server::serve(listener, sink.clone(), cancel.clone()));

    let engine_config = config.engine_config()?;
    info!(
        spend = %config.metrics.spend_window,
        request = %config.metrics.request_window,
        error = %config.metrics.error_window,
        update_interval_secs = config.metrics.update_interval,
        "Using time windows"
    );
    let engine = MetricsEngine::new(port, sink, engine_config);
    engine.publish_windows()?;

    // existence checks get a single attempt each; the gate does its own backoff
    let gate = AvailabilityGate::over_source(source.clone());
    let required = config.metrics.required_tables.clone();
    if gate.wait_for_tables(&required, config.table_wait(), cancel).await {
        info!("All required tables are available");
    } else {
        warn!("Required tables not available, continuing with graceful degradation");
    }

    let collector = Arc::new(GatedCollector::new(gate, engine, required));
    let cycles = CollectionLoop::new(collector, config.update_interval(), cancel.clone())
        .run()
        .await;

    cancel.cancel();
    server.await??;
    Ok(cycles)
}
