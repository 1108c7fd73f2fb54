mod sampler;
mod server;

pub use sampler::sample_queue_depth;
pub use server::serve;

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use fledgling_core::CrawlError;

pub const OP_UPLOAD: &str = "upload";
pub const OP_DOWNLOAD: &str = "download";

/// Every counter, histogram, and gauge the two services export. One
/// instance per process, registered against a private registry and shared
/// behind an `Arc`.
pub struct CrawlMetrics {
    registry: Registry,

    // fetcher
    pub pages_fetched: IntCounterVec,
    pub fetch_errors: IntCounterVec,
    pub robots_blocked: IntCounter,
    pub fetch_duration: Histogram,
    pub queue_depth: IntGaugeVec,

    // parser
    pub pages_parsed: IntCounter,
    pub links_extracted: IntCounter,
    pub parse_duration: Histogram,

    // blob store
    pub blob_duration: HistogramVec,
    pub blob_errors: IntCounterVec,
}

impl CrawlMetrics {
    pub fn new() -> Result<Self, CrawlError> {
        let registry = Registry::new();

        let pages_fetched = IntCounterVec::new(
            Opts::new(
                "crawler_pages_fetched_total",
                "Total number of pages fetched successfully",
            ),
            &["status_code"],
        )
        .map_err(metrics_err)?;

        let fetch_errors = IntCounterVec::new(
            Opts::new(
                "crawler_fetch_errors_total",
                "Total number of fetch errors found",
            ),
            &["status_code", "kind"],
        )
        .map_err(metrics_err)?;

        let robots_blocked = IntCounter::new(
            "crawler_robots_blocked_total",
            "Number of requests blocked by robots.txt",
        )
        .map_err(metrics_err)?;

        let fetch_duration = Histogram::with_opts(HistogramOpts::new(
            "crawler_fetch_duration_seconds",
            "Time taken to download a page",
        ))
        .map_err(metrics_err)?;

        let queue_depth = IntGaugeVec::new(
            Opts::new(
                "crawler_queue_depth_total",
                "Current number of items in each coordination queue",
            ),
            &["queue_name"],
        )
        .map_err(metrics_err)?;

        let pages_parsed = IntCounter::new(
            "parser_pages_processed_total",
            "Total HTML pages parsed",
        )
        .map_err(metrics_err)?;

        let links_extracted = IntCounter::new(
            "parser_links_extracted_total",
            "Total new links found on pages",
        )
        .map_err(metrics_err)?;

        let parse_duration = Histogram::with_opts(HistogramOpts::new(
            "parser_processing_duration_seconds",
            "Time taken to parse HTML",
        ))
        .map_err(metrics_err)?;

        let blob_duration = HistogramVec::new(
            HistogramOpts::new(
                "s3_interaction_duration_seconds",
                "Time taken to read/write the blob store",
            ),
            &["operation"],
        )
        .map_err(metrics_err)?;

        let blob_errors = IntCounterVec::new(
            Opts::new(
                "s3_interaction_errors_total",
                "Total number of blob store read/write errors",
            ),
            &["operation"],
        )
        .map_err(metrics_err)?;

        for collector in [
            Box::new(pages_fetched.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(fetch_errors.clone()),
            Box::new(robots_blocked.clone()),
            Box::new(fetch_duration.clone()),
            Box::new(queue_depth.clone()),
            Box::new(pages_parsed.clone()),
            Box::new(links_extracted.clone()),
            Box::new(parse_duration.clone()),
            Box::new(blob_duration.clone()),
            Box::new(blob_errors.clone()),
        ] {
            registry.register(collector).map_err(metrics_err)?;
        }

        Ok(Self {
            registry,
            pages_fetched,
            fetch_errors,
            robots_blocked,
            fetch_duration,
            queue_depth,
            pages_parsed,
            links_extracted,
            parse_duration,
            blob_duration,
            blob_errors,
        })
    }

    /// Prometheus text exposition of everything registered.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

fn metrics_err(e: prometheus::Error) -> CrawlError {
    CrawlError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_exports_families() {
        let metrics = CrawlMetrics::new().unwrap();
        metrics.pages_fetched.with_label_values(&["200"]).inc();
        metrics.robots_blocked.inc();
        metrics.fetch_errors.with_label_values(&["0", "network"]).inc();
        metrics
            .blob_duration
            .with_label_values(&[OP_UPLOAD])
            .observe(0.02);
        metrics.queue_depth.with_label_values(&["url_queue"]).set(7);

        let text = metrics.render();
        assert!(text.contains("crawler_pages_fetched_total{status_code=\"200\"} 1"));
        assert!(text.contains("crawler_robots_blocked_total 1"));
        assert!(text.contains("crawler_fetch_errors_total{kind=\"network\",status_code=\"0\"} 1"));
        assert!(text.contains("crawler_queue_depth_total{queue_name=\"url_queue\"} 7"));
        assert!(text.contains("s3_interaction_duration_seconds"));
    }

    #[test]
    fn test_fresh_registry_per_instance() {
        // Two instances must not collide the way a global registry would.
        let first = CrawlMetrics::new().unwrap();
        let second = CrawlMetrics::new().unwrap();
        first.pages_parsed.inc();
        assert!(!second.render().contains("parser_pages_processed_total 1"));
    }
}
