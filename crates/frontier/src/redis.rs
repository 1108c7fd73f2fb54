use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use fledgling_coord::CoordStore;
use fledgling_core::{CrawlError, CrawlResult, DeadLetter, Frontier, UrlTarget};

use crate::{DLQ_KEY, PARSE_QUEUE_KEY, URL_QUEUE_KEY, VISITED_KEY};

/// Durable frontier over the coordination store: three named lists plus the
/// visited set. Admission control lives in `push`, so a duplicate URL is
/// rejected before it ever consumes queue space.
pub struct RedisFrontier {
    store: CoordStore,
}

impl RedisFrontier {
    pub fn new(store: CoordStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Frontier for RedisFrontier {
    async fn push(&self, urls: &[String], depth: u32) -> Result<(), CrawlError> {
        for url in urls {
            // Set-add is the commit point: the small window between it and
            // the queue push can lose a URL on crash, which at-most-once
            // semantics accept.
            if !self.store.sadd(VISITED_KEY, url).await? {
                continue;
            }

            let target = UrlTarget::new(url.clone(), depth);
            let payload = encode(&target)?;
            self.store.rpush(URL_QUEUE_KEY, &payload).await?;
            debug!(url = %url, depth, "admitted to frontier");
        }
        Ok(())
    }

    async fn pop(&self) -> Result<UrlTarget, CrawlError> {
        match self.store.lpop(URL_QUEUE_KEY).await? {
            Some(payload) => decode(&payload),
            None => Err(CrawlError::QueueEmpty),
        }
    }

    async fn complete(&self, _id: &str) -> Result<(), CrawlError> {
        // Pop already removed the item; nothing to acknowledge yet.
        Ok(())
    }

    async fn push_dlq(&self, target: &UrlTarget, reason: &str) -> Result<(), CrawlError> {
        let letter = DeadLetter {
            target: target.clone(),
            error: reason.to_string(),
            time: Utc::now(),
        };
        let payload = encode(&letter)?;
        self.store.rpush(DLQ_KEY, &payload).await?;
        warn!(url = %target.url, reason, "dead-lettered");
        Ok(())
    }

    async fn push_to_parser(&self, result: &CrawlResult) -> Result<(), CrawlError> {
        let payload = encode(result)?;
        self.store.rpush(PARSE_QUEUE_KEY, &payload).await
    }

    async fn pop_from_parser(&self) -> Result<CrawlResult, CrawlError> {
        match self.store.lpop(PARSE_QUEUE_KEY).await? {
            Some(payload) => decode(&payload),
            None => Err(CrawlError::QueueEmpty),
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, CrawlError> {
    serde_json::to_string(value).map_err(|e| CrawlError::Parse(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T, CrawlError> {
    serde_json::from_str(payload).map_err(|e| CrawlError::Parse(e.to_string()))
}
