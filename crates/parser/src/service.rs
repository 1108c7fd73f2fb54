use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fledgling_core::urls::{resolve_link, same_host};
use fledgling_core::{BlobStore, CrawlError, Frontier, PageParser};
use fledgling_metrics::{CrawlMetrics, OP_DOWNLOAD};

const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_millis(100);

/// The parser service: workers pull handoff records, load the stored body,
/// extract links, and feed the survivors back into the frontier one level
/// deeper. Admission dedup happens inside `Frontier::push`.
pub struct ParseCoordinator {
    frontier: Arc<dyn Frontier>,
    storage: Arc<dyn BlobStore>,
    parser: Arc<dyn PageParser>,
    metrics: Arc<CrawlMetrics>,
    workers: usize,
    cross_domain: bool,
}

impl ParseCoordinator {
    pub fn new(
        frontier: Arc<dyn Frontier>,
        storage: Arc<dyn BlobStore>,
        parser: Arc<dyn PageParser>,
        metrics: Arc<CrawlMetrics>,
        workers: usize,
        cross_domain: bool,
    ) -> Self {
        Self {
            frontier,
            storage,
            parser,
            metrics,
            workers,
            cross_domain,
        }
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let coordinator = Arc::clone(&self);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                coordinator.worker(cancel, worker_id).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        info!("all parse workers shut down cleanly");
    }

    async fn worker(&self, cancel: CancellationToken, worker_id: usize) {
        info!(worker_id, "parse worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let msg = match self.frontier.pop_from_parser().await {
                Ok(msg) => msg,
                Err(e) => {
                    if !matches!(e, CrawlError::QueueEmpty) {
                        warn!(worker_id, "parse queue pop failed: {e}");
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(EMPTY_QUEUE_BACKOFF) => {}
                    }
                    continue;
                }
            };

            let timer = self
                .metrics
                .blob_duration
                .with_label_values(&[OP_DOWNLOAD])
                .start_timer();
            let loaded = self.storage.get(&msg.s3_key).await;
            timer.observe_duration();

            let body = match loaded {
                Ok(body) => body,
                Err(e) => {
                    error!(worker_id, url = %msg.url, key = %msg.s3_key, "blob load failed: {e}");
                    self.metrics
                        .blob_errors
                        .with_label_values(&[OP_DOWNLOAD])
                        .inc();
                    continue;
                }
            };

            let timer = self.metrics.parse_duration.start_timer();
            let parsed = self.parser.parse(&body);
            timer.observe_duration();

            let parsed = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(worker_id, url = %msg.url, "parse error: {e}");
                    continue;
                }
            };

            self.metrics.pages_parsed.inc();
            self.metrics
                .links_extracted
                .inc_by(parsed.links.len() as u64);

            let admitted = filter_links(&msg.url, &parsed.links, self.cross_domain);
            if !admitted.is_empty() {
                if let Err(e) = self.frontier.push(&admitted, msg.depth + 1).await {
                    error!(worker_id, url = %msg.url, "frontier push failed: {e}");
                }
            }

            info!(
                worker_id,
                url = %msg.url,
                links = parsed.links.len(),
                admitted = admitted.len(),
                "page processed"
            );
        }

        info!(worker_id, "parse worker shutting down");
    }
}

/// Resolve raw hrefs against the page URL, dropping malformed links and,
/// unless cross-domain crawling is on, links leaving the page's host.
fn filter_links(page_url: &str, raw: &[String], cross_domain: bool) -> Vec<String> {
    let mut links = Vec::with_capacity(raw.len());
    for link in raw {
        let Some(resolved) = resolve_link(page_url, link) else {
            continue;
        };
        if !cross_domain && !same_host(page_url, &resolved) {
            continue;
        }
        links.push(resolved);
    }
    links
}
