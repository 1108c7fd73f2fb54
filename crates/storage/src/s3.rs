use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::{debug, info};

use fledgling_core::{BlobStore, CrawlError};

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Blob store over any S3-compatible object store. Path-style addressing is
/// required for MinIO.
pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn new(config: &S3Config) -> Result<Self, CrawlError> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| CrawlError::Config(e.to_string()))?;

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| CrawlError::Config(e.to_string()))?
            .with_path_style();

        info!(bucket = %config.bucket, endpoint = %config.endpoint, "blob store ready");
        Ok(Self {
            bucket: Box::new(bucket),
        })
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), CrawlError> {
        let resp = self.bucket.put_object(key, data).await.map_err(blob_err)?;
        if !(200..300).contains(&resp.status_code()) {
            return Err(CrawlError::Blob(format!(
                "put {key}: status {}",
                resp.status_code()
            )));
        }
        debug!(key, bytes = data.len(), "blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CrawlError> {
        let resp = self.bucket.get_object(key).await.map_err(blob_err)?;
        if !(200..300).contains(&resp.status_code()) {
            return Err(CrawlError::Blob(format!(
                "get {key}: status {}",
                resp.status_code()
            )));
        }
        Ok(resp.bytes().to_vec())
    }
}

fn blob_err(e: s3::error::S3Error) -> CrawlError {
    CrawlError::Blob(e.to_string())
}
