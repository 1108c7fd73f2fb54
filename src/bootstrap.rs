use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fledgling_coord::CoordStore;
use fledgling_core::CrawlError;
use fledgling_frontier::{DLQ_KEY, PARSE_QUEUE_KEY, URL_QUEUE_KEY};
use fledgling_metrics::{sample_queue_depth, serve, CrawlMetrics};
use fledgling_storage::{S3Config, S3Store};

use crate::cli::StoreArgs;

pub const USER_AGENT: &str = "fledgling/1.0";
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const FETCH_RETRIES: u32 = 3;

pub fn init_tracing(service: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    info!(service, "logger initialized");
}

/// Connect both shared stores. Any failure here is fatal to the service.
pub async fn connect_stores(args: &StoreArgs) -> Result<(CoordStore, Arc<S3Store>), CrawlError> {
    let coord = CoordStore::connect(&args.redis_addr, &args.redis_pass, args.redis_db).await?;
    let blob = S3Store::new(&S3Config {
        endpoint: args.s3_endpoint.clone(),
        bucket: args.s3_bucket.clone(),
        region: args.s3_region.clone(),
        access_key: args.s3_user.clone(),
        secret_key: args.s3_pass.clone(),
    })?;
    Ok((coord, Arc::new(blob)))
}

/// Root cancellation token, cancelled on Ctrl-C.
pub fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            trigger.cancel();
        }
    });
    cancel
}

/// Start the /metrics endpoint and the queue-depth sampler in the
/// background. The endpoint lives until process exit; the sampler stops on
/// cancellation.
pub fn spawn_metrics(
    metrics: Arc<CrawlMetrics>,
    store: CoordStore,
    port: u16,
    cancel: &CancellationToken,
) {
    {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(e) = serve(metrics, port).await {
                error!("metrics server exited: {e}");
            }
        });
    }

    let queues = vec![
        ("url_queue".to_string(), URL_QUEUE_KEY.to_string()),
        ("parser_queue".to_string(), PARSE_QUEUE_KEY.to_string()),
        ("dlq".to_string(), DLQ_KEY.to_string()),
    ];
    tokio::spawn(sample_queue_depth(metrics, store, queues, cancel.clone()));
}
