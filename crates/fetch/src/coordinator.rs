use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fledgling_core::urls::{canonical_key, host_of};
use fledgling_core::{
    BlobStore, CrawlError, CrawlResult, Fetcher, Frontier, RateLimiter, UrlTarget,
    DEFAULT_CRAWL_DELAY,
};
use fledgling_metrics::{CrawlMetrics, OP_UPLOAD};
use fledgling_robots::RobotsPolicy;

const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_millis(500);

/// The fetcher service: a pool of workers that pull admitted URLs from the
/// frontier, honor robots and per-host politeness, download, persist the
/// body, and hand the page off to the parser service.
pub struct FetchCoordinator {
    frontier: Arc<dyn Frontier>,
    fetcher: Arc<dyn Fetcher>,
    limiter: Arc<dyn RateLimiter>,
    storage: Arc<dyn BlobStore>,
    robots: Arc<RobotsPolicy>,
    metrics: Arc<CrawlMetrics>,
    workers: usize,
}

impl FetchCoordinator {
    pub fn new(
        frontier: Arc<dyn Frontier>,
        fetcher: Arc<dyn Fetcher>,
        limiter: Arc<dyn RateLimiter>,
        storage: Arc<dyn BlobStore>,
        robots: Arc<RobotsPolicy>,
        metrics: Arc<CrawlMetrics>,
        workers: usize,
    ) -> Self {
        Self {
            frontier,
            fetcher,
            limiter,
            storage,
            robots,
            metrics,
            workers,
        }
    }

    /// Spawn the worker pool and join every worker. Returns once all
    /// workers have observed the cancellation and finished their current
    /// iteration.
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
        info!("all fetch workers shut down cleanly");
    }

    async fn worker(&self, cancel: CancellationToken, worker_id: usize) {
        info!(worker_id, "fetch worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let target = match self.frontier.pop().await {
                Ok(target) => target,
                Err(CrawlError::QueueEmpty) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(EMPTY_QUEUE_BACKOFF) => {}
                    }
                    continue;
                }
                Err(e) => {
                    warn!(worker_id, "frontier pop failed: {e}");
                    continue;
                }
            };

            let host = match host_of(&target.url) {
                Ok(host) => host,
                Err(e) => {
                    warn!(worker_id, url = %target.url, "invalid URL in queue: {e}");
                    self.finish(&target).await;
                    continue;
                }
            };

            if !self.robots.is_allowed(&target.url).await {
                debug!(worker_id, url = %target.url, "blocked by robots.txt");
                self.metrics.robots_blocked.inc();
                self.finish(&target).await;
                continue;
            }

            // Politeness floor applies even when robots.txt asks for less.
            let delay = self
                .robots
                .crawl_delay(&target.url)
                .await
                .max(DEFAULT_CRAWL_DELAY);

            match self.limiter.wait(&cancel, &host, delay).await {
                Ok(()) => {}
                Err(CrawlError::Cancelled) => break,
                Err(e) => {
                    // The target is already popped; dropping it here is the
                    // accepted at-most-once loss.
                    error!(worker_id, url = %target.url, "rate limiter failed: {e}");
                    continue;
                }
            }

            self.process(&cancel, &target, worker_id).await;
            self.finish(&target).await;
        }

        info!(worker_id, "fetch worker shutting down");
    }

    /// Everything past the rate limiter: fetch, persist, hand off. Every
    /// exit path is followed by `complete` in the caller.
    async fn process(&self, cancel: &CancellationToken, target: &UrlTarget, worker_id: usize) {
        debug!(worker_id, url = %target.url, depth = target.depth, "fetching");

        let timer = self.metrics.fetch_duration.start_timer();
        let fetched = self.fetcher.fetch(cancel, &target.url).await;
        timer.observe_duration();

        let page = match fetched {
            Ok(page) => page,
            Err(CrawlError::Cancelled) => {
                debug!(worker_id, url = %target.url, "fetch cancelled mid-flight");
                return;
            }
            Err(CrawlError::BodyRead(reason)) => {
                // Logged and dropped; this class never reaches the DLQ.
                warn!(worker_id, url = %target.url, "body read failed: {reason}");
                return;
            }
            Err(e) => {
                warn!(worker_id, url = %target.url, "fetch failed permanently: {e}");
                self.metrics
                    .fetch_errors
                    .with_label_values(&[&e.status_label(), e.kind_label()])
                    .inc();
                self.dead_letter(target, &e.to_string(), worker_id).await;
                return;
            }
        };

        let status_label = page.status.to_string();
        self.metrics
            .pages_fetched
            .with_label_values(&[&status_label])
            .inc();

        if page.body.is_empty() {
            warn!(worker_id, url = %target.url, "nil response body");
            self.metrics
                .fetch_errors
                .with_label_values(&[&status_label, "nil body"])
                .inc();
            self.dead_letter(target, "nil body response", worker_id).await;
            return;
        }

        let s3_key = canonical_key(&target.url);

        let timer = self
            .metrics
            .blob_duration
            .with_label_values(&[OP_UPLOAD])
            .start_timer();
        let stored = self.storage.put(&s3_key, &page.body).await;
        timer.observe_duration();

        if let Err(e) = stored {
            error!(worker_id, url = %target.url, key = %s3_key, "blob store put failed: {e}");
            self.metrics
                .blob_errors
                .with_label_values(&[OP_UPLOAD])
                .inc();
            self.dead_letter(target, "storage upload failed", worker_id).await;
            return;
        }

        let handoff = CrawlResult {
            url: target.url.clone(),
            s3_key,
            depth: target.depth,
            saved_at: Utc::now(),
        };
        match self.frontier.push_to_parser(&handoff).await {
            // A failed handoff orphans the stored blob; accepted and logged.
            Err(e) => error!(worker_id, url = %target.url, "parse queue push failed: {e}"),
            Ok(()) => {
                info!(worker_id, url = %target.url, key = %handoff.s3_key, "fetched and handed off")
            }
        }
    }

    async fn dead_letter(&self, target: &UrlTarget, reason: &str, worker_id: usize) {
        if let Err(e) = self.frontier.push_dlq(target, reason).await {
            error!(worker_id, url = %target.url, "DLQ push failed: {e}");
        }
    }

    async fn finish(&self, target: &UrlTarget) {
        if let Err(e) = self.frontier.complete(&target.id).await {
            warn!(url = %target.url, "complete failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use fledgling_core::FetchResult;
    use fledgling_frontier::MemoryFrontier;
    use fledgling_storage::MemoryStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::{RetryFetcher, WebFetcher};

    /// Test limiter: admits immediately, never touches a store.
    struct AllowAllLimiter;

    #[async_trait]
    impl RateLimiter for AllowAllLimiter {
        async fn wait(
            &self,
            _cancel: &CancellationToken,
            _host: &str,
            _delay: Duration,
        ) -> Result<(), CrawlError> {
            Ok(())
        }
    }

    struct Harness {
        frontier: Arc<MemoryFrontier>,
        storage: Arc<MemoryStore>,
        metrics: Arc<CrawlMetrics>,
        coordinator: Arc<FetchCoordinator>,
    }

    fn harness(fetcher: Arc<dyn Fetcher>, workers: usize) -> Harness {
        let frontier = Arc::new(MemoryFrontier::new());
        let storage = Arc::new(MemoryStore::new());
        let metrics = Arc::new(CrawlMetrics::new().unwrap());
        let robots = Arc::new(
            RobotsPolicy::new("fledgling/1.0", Duration::from_secs(2)).unwrap(),
        );
        let coordinator = Arc::new(FetchCoordinator::new(
            Arc::clone(&frontier) as Arc<dyn Frontier>,
            fetcher,
            Arc::new(AllowAllLimiter),
            Arc::clone(&storage) as Arc<dyn BlobStore>,
            robots,
            Arc::clone(&metrics),
            workers,
        ));
        Harness {
            frontier,
            storage,
            metrics,
            coordinator,
        }
    }

    async fn wait_until<F, Fut>(mut probe: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if probe().await {
                    break;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_stores_blob_and_hands_off() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>seed</html>"))
            .mount(&server)
            .await;

        let fetcher = Arc::new(WebFetcher::new("fledgling/1.0", Duration::from_secs(5)).unwrap());
        let h = harness(fetcher, 2);

        let seed = format!("{}/", server.uri());
        h.frontier.push(&[seed.clone()], 0).await.unwrap();

        let cancel = CancellationToken::new();
        let run = tokio::spawn(Arc::clone(&h.coordinator).run(cancel.clone()));

        let frontier = Arc::clone(&h.frontier);
        wait_until(|| {
            let frontier = Arc::clone(&frontier);
            async move { frontier.parse_queue_len().await == 1 }
        })
        .await;

        cancel.cancel();
        run.await.unwrap();

        let handoff = h.frontier.pop_from_parser().await.unwrap();
        assert_eq!(handoff.url, seed);
        assert_eq!(handoff.depth, 0);
        assert_eq!(handoff.s3_key, canonical_key(&seed));
        assert_eq!(
            h.storage.get(&handoff.s3_key).await.unwrap(),
            b"<html>seed</html>"
        );
        assert!(h.frontier.dead_letters().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_robots_denied_url_is_never_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /private/\n"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = Arc::new(WebFetcher::new("fledgling/1.0", Duration::from_secs(5)).unwrap());
        let h = harness(fetcher, 1);

        h.frontier
            .push(&[format!("{}/private/page", server.uri())], 0)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let run = tokio::spawn(Arc::clone(&h.coordinator).run(cancel.clone()));

        let metrics = Arc::clone(&h.metrics);
        wait_until(|| {
            let blocked = metrics.robots_blocked.get();
            async move { blocked == 1 }
        })
        .await;

        cancel.cancel();
        run.await.unwrap();

        assert_eq!(h.frontier.parse_queue_len().await, 0);
        assert!(h.frontier.dead_letters().await.is_empty());
        assert!(h.storage.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_persistent_failure_lands_in_dlq() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let base = Arc::new(WebFetcher::new("fledgling/1.0", Duration::from_secs(5)).unwrap());
        // retries=2 keeps the single 1s backoff short enough for a live test
        let fetcher = Arc::new(RetryFetcher::with_seed(base, 2, 11));
        let h = harness(fetcher, 1);

        let url = format!("{}/down", server.uri());
        h.frontier.push(&[url.clone()], 1).await.unwrap();

        let cancel = CancellationToken::new();
        let run = tokio::spawn(Arc::clone(&h.coordinator).run(cancel.clone()));

        let frontier = Arc::clone(&h.frontier);
        wait_until(|| {
            let frontier = Arc::clone(&frontier);
            async move { !frontier.dead_letters().await.is_empty() }
        })
        .await;

        cancel.cancel();
        run.await.unwrap();

        let letters = h.frontier.dead_letters().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].target.url, url);
        assert_eq!(letters[0].target.depth, 1);
        assert!(letters[0].error.contains("500"));
        assert_eq!(h.frontier.parse_queue_len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_body_read_failure_is_dropped_without_dlq() {
        /// Fails mid-body after a good status line, every time.
        #[derive(Default)]
        struct BrokenBodyFetcher {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Fetcher for BrokenBodyFetcher {
            async fn fetch(
                &self,
                _cancel: &CancellationToken,
                _url: &str,
            ) -> Result<FetchResult, CrawlError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(CrawlError::BodyRead("connection reset mid-body".into()))
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Arc::new(BrokenBodyFetcher::default());
        let h = harness(Arc::clone(&fetcher) as Arc<dyn Fetcher>, 1);

        h.frontier
            .push(&[format!("{}/page", server.uri())], 0)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let run = tokio::spawn(Arc::clone(&h.coordinator).run(cancel.clone()));

        wait_until(|| {
            let calls = fetcher.calls.load(Ordering::SeqCst);
            async move { calls >= 1 }
        })
        .await;

        cancel.cancel();
        run.await.unwrap();

        assert!(h.frontier.dead_letters().await.is_empty());
        assert_eq!(h.frontier.parse_queue_len().await, 0);
        assert!(h.storage.is_empty());
    }
}
