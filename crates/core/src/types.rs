use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::CrawlError;

/// A URL admitted to the frontier. Created once a URL passes the visited-set
/// check; immutable afterwards. `id` is currently the URL itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTarget {
    pub id: String,
    pub url: String,
    pub depth: u32,
}

impl UrlTarget {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        let url = url.into();
        Self {
            id: url.clone(),
            url,
            depth,
        }
    }
}

/// Handoff record from the fetcher to the parser: the page body lives in the
/// blob store under `s3_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub s3_key: String,
    pub depth: u32,
    pub saved_at: DateTime<Utc>,
}

/// Terminal record for a URL that failed after all retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub target: UrlTarget,
    pub error: String,
    pub time: DateTime<Utc>,
}

/// A successful (2xx) fetch. Failure states never construct this type, so
/// callers cannot read response fields off an errored request.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Output of the HTML parser: raw href values and concatenated page text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub text: String,
    pub links: Vec<String>,
}

#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> Result<FetchResult, CrawlError>;
}

pub trait PageParser: Send + Sync + 'static {
    fn parse(&self, body: &[u8]) -> Result<ParsedPage, CrawlError>;
}

#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// Returns once the caller may proceed with a request to `host`,
    /// enforcing `delay` as the minimum inter-fetch spacing across every
    /// worker of every service instance.
    async fn wait(
        &self,
        cancel: &CancellationToken,
        host: &str,
        delay: Duration,
    ) -> Result<(), CrawlError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), CrawlError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, CrawlError>;
}

/// The admission-controlled URL queue plus the visited set, the parse queue,
/// and the dead-letter queue.
#[async_trait]
pub trait Frontier: Send + Sync + 'static {
    /// Admit each URL at most once: set-add on the visited set, and on
    /// novelty enqueue a `UrlTarget`. Duplicates are silently skipped.
    /// There is no bulk atomicity; a mid-slice failure leaves a prefix
    /// pushed.
    async fn push(&self, urls: &[String], depth: u32) -> Result<(), CrawlError>;

    /// Pop one target. `CrawlError::QueueEmpty` when there is nothing to do;
    /// never blocks waiting for work.
    async fn pop(&self) -> Result<UrlTarget, CrawlError>;

    /// Acknowledge a popped target. Currently a no-op: pop is the commit
    /// point and the crawl is at-most-once per URL.
    async fn complete(&self, id: &str) -> Result<(), CrawlError>;

    /// Record a permanently failed target.
    async fn push_dlq(&self, target: &UrlTarget, reason: &str) -> Result<(), CrawlError>;

    async fn push_to_parser(&self, result: &CrawlResult) -> Result<(), CrawlError>;

    async fn pop_from_parser(&self) -> Result<CrawlResult, CrawlError>;
}

/// Default floor for per-host politeness when robots.txt specifies nothing
/// larger.
pub const DEFAULT_CRAWL_DELAY: Duration = Duration::from_secs(1);
