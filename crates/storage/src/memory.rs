use async_trait::async_trait;
use dashmap::DashMap;

use fledgling_core::{BlobStore, CrawlError};

/// In-process blob store. Backs tests and store-less local runs.
#[derive(Default)]
pub struct MemoryStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), CrawlError> {
        self.blobs.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CrawlError> {
        self.blobs
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CrawlError::Blob(format!("no blob under {key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryStore::new();
        store.put("example.com/index.html", b"<html></html>").await.unwrap();
        assert_eq!(
            store.get("example.com/index.html").await.unwrap(),
            b"<html></html>"
        );
    }

    #[tokio::test]
    async fn test_get_missing_key_errors() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("absent").await,
            Err(CrawlError::Blob(_))
        ));
    }
}
