use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tracing::info;

use fledgling_core::CrawlError;

use crate::CrawlMetrics;

/// Serve `GET /metrics` until the process exits. Bind failure is an
/// initialization failure.
pub async fn serve(metrics: Arc<CrawlMetrics>, port: u16) -> Result<(), CrawlError> {
    let app = Router::new()
        .route("/metrics", get(render))
        .with_state(metrics);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CrawlError::Config(format!("metrics bind {addr}: {e}")))?;
    info!(addr, "metrics server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| CrawlError::Config(format!("metrics server: {e}")))
}

async fn render(State(metrics): State<Arc<CrawlMetrics>>) -> String {
    metrics.render()
}
