use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use fledgling_core::CrawlError;

/// Remaining lifetime of a coordination-store key, mapping the store's
/// negative sentinels onto proper variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    NoExpiry,
    Remaining(Duration),
}

/// Client for the shared coordination store. Cheap to clone; every clone
/// multiplexes over the same managed connection.
#[derive(Clone)]
pub struct CoordStore {
    conn: ConnectionManager,
}

impl CoordStore {
    /// Connect to the store. Failure here is an initialization failure and
    /// fatal to the service.
    pub async fn connect(addr: &str, password: &str, db: i64) -> Result<Self, CrawlError> {
        let url = if password.is_empty() {
            format!("redis://{addr}/{db}")
        } else {
            format!("redis://:{password}@{addr}/{db}")
        };
        let client = redis::Client::open(url).map_err(store_err)?;
        let conn = ConnectionManager::new(client).await.map_err(store_err)?;
        info!(addr, db, "connected to coordination store");
        Ok(Self { conn })
    }

    pub async fn rpush(&self, key: &str, value: &str) -> Result<(), CrawlError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(key, value).await.map_err(store_err)?;
        Ok(())
    }

    pub async fn lpop(&self, key: &str) -> Result<Option<String>, CrawlError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.lpop(key, None).await.map_err(store_err)?;
        Ok(value)
    }

    pub async fn llen(&self, key: &str) -> Result<u64, CrawlError> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(key).await.map_err(store_err)?;
        Ok(len)
    }

    /// Set-add returning novelty: true iff the member was not already
    /// present.
    pub async fn sadd(&self, key: &str, member: &str) -> Result<bool, CrawlError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(key, member).await.map_err(store_err)?;
        Ok(added == 1)
    }

    /// SET key value NX PX ttl. True iff this call created the key.
    pub async fn set_nx_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CrawlError> {
        let mut conn = self.conn.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(reply.is_some())
    }

    pub async fn pttl(&self, key: &str) -> Result<KeyTtl, CrawlError> {
        let mut conn = self.conn.clone();
        let ms: i64 = conn.pttl(key).await.map_err(store_err)?;
        Ok(ttl_from_millis(ms))
    }
}

fn ttl_from_millis(ms: i64) -> KeyTtl {
    match ms {
        -1 => KeyTtl::NoExpiry,
        ms if ms < 0 => KeyTtl::Missing,
        ms => KeyTtl::Remaining(Duration::from_millis(ms as u64)),
    }
}

fn store_err(e: redis::RedisError) -> CrawlError {
    CrawlError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_sentinel_mapping() {
        assert_eq!(ttl_from_millis(-2), KeyTtl::Missing);
        assert_eq!(ttl_from_millis(-1), KeyTtl::NoExpiry);
        assert_eq!(
            ttl_from_millis(1500),
            KeyTtl::Remaining(Duration::from_millis(1500))
        );
        assert_eq!(ttl_from_millis(0), KeyTtl::Remaining(Duration::ZERO));
    }
}
