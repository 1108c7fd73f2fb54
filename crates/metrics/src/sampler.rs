use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use fledgling_coord::CoordStore;

use crate::CrawlMetrics;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Background task: every five seconds read the length of each named queue
/// and publish it on the depth gauge. Runs until cancelled.
pub async fn sample_queue_depth(
    metrics: Arc<CrawlMetrics>,
    store: CoordStore,
    queues: Vec<(String, String)>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                for (label, key) in &queues {
                    match store.llen(key).await {
                        Ok(len) => {
                            metrics
                                .queue_depth
                                .with_label_values(&[label.as_str()])
                                .set(len as i64);
                        }
                        Err(e) => warn!(key, "queue depth sample failed: {e}"),
                    }
                }
            }
        }
    }
}
