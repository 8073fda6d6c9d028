//! HTTP pull endpoint
//!
//! - `GET /metrics`: text exposition of the sink's registry
//! - `GET /health`: `ok` while the process is serving

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use litellm_exporter_collector::PrometheusSink;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub fn router(sink: Arc<PrometheusSink>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(sink)
}

/// Serve until `cancel` fires, then drain in-flight requests
pub async fn serve(listener: TcpListener, sink: Arc<PrometheusSink>, cancel: CancellationToken) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Metrics endpoint listening");
    }

    axum::serve(listener, router(sink))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Metrics endpoint stopped");
    Ok(())
}

async fn metrics(State(sink): State<Arc<PrometheusSink>>) -> Response {
    match sink.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, sink.content_type())], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health() -> &'static str {
    "ok"
}
