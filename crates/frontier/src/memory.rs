use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use fledgling_core::{CrawlError, CrawlResult, DeadLetter, Frontier, UrlTarget};

#[derive(Default)]
struct Inner {
    pending: VecDeque<UrlTarget>,
    visited: HashSet<String>,
    parse_queue: VecDeque<CrawlResult>,
    dlq: Vec<DeadLetter>,
}

/// Single-process frontier with the same admission semantics as the durable
/// one. Backs the test suite and single-node runs with no store at hand.
#[derive(Default)]
pub struct MemoryFrontier {
    inner: Mutex<Inner>,
}

impl MemoryFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn visited_len(&self) -> usize {
        self.inner.lock().await.visited.len()
    }

    pub async fn parse_queue_len(&self) -> usize {
        self.inner.lock().await.parse_queue.len()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.lock().await.dlq.clone()
    }
}

#[async_trait]
impl Frontier for MemoryFrontier {
    async fn push(&self, urls: &[String], depth: u32) -> Result<(), CrawlError> {
        let mut inner = self.inner.lock().await;
        for url in urls {
            if !inner.visited.insert(url.clone()) {
                continue;
            }
            inner.pending.push_back(UrlTarget::new(url.clone(), depth));
        }
        Ok(())
    }

    async fn pop(&self) -> Result<UrlTarget, CrawlError> {
        self.inner
            .lock()
            .await
            .pending
            .pop_front()
            .ok_or(CrawlError::QueueEmpty)
    }

    async fn complete(&self, _id: &str) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn push_dlq(&self, target: &UrlTarget, reason: &str) -> Result<(), CrawlError> {
        self.inner.lock().await.dlq.push(DeadLetter {
            target: target.clone(),
            error: reason.to_string(),
            time: Utc::now(),
        });
        Ok(())
    }

    async fn push_to_parser(&self, result: &CrawlResult) -> Result<(), CrawlError> {
        self.inner.lock().await.parse_queue.push_back(result.clone());
        Ok(())
    }

    async fn pop_from_parser(&self) -> Result<CrawlResult, CrawlError> {
        self.inner
            .lock()
            .await
            .parse_queue
            .pop_front()
            .ok_or(CrawlError::QueueEmpty)
    }
}
