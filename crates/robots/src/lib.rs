use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use texting_robots::Robot;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use fledgling_core::urls::host_key;
use fledgling_core::CrawlError;

/// Per-host robots.txt policy with an in-process cache.
///
/// Unreachable, non-2xx, or unparseable robots.txt caches as `None` and is
/// treated as allow-all with zero delay: the crawler never blocks itself on
/// robots errors. Entries live for the process lifetime.
pub struct RobotsPolicy {
    user_agent: String,
    client: reqwest::Client,
    cache: RwLock<HashMap<String, Option<Arc<Robot>>>>,
}

impl RobotsPolicy {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| CrawlError::Config(e.to_string()))?;

        Ok(Self {
            user_agent: user_agent.to_string(),
            client,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Whether the configured user agent may fetch `url`. Unparseable URLs
    /// are permissive; the coordinator rejects those separately.
    pub async fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        match self.group_for(&parsed).await {
            Some(robot) => robot.allowed(url),
            None => true,
        }
    }

    /// Crawl-delay for the host of `url`; zero when robots.txt specifies
    /// none or could not be read.
    pub async fn crawl_delay(&self, url: &str) -> Duration {
        let Ok(parsed) = Url::parse(url) else {
            return Duration::ZERO;
        };
        match self.group_for(&parsed).await {
            Some(robot) => robot
                .delay
                .map(Duration::from_secs_f32)
                .unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }

    async fn group_for(&self, url: &Url) -> Option<Arc<Robot>> {
        // Same host notion as the rate limiter and cross-domain filter.
        let key = host_key(url)?;

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                return entry.clone();
            }
        }

        // Read-check-then-write is intentionally non-atomic: two concurrent
        // misses for one host both fetch, and the later write wins.
        let group = self.fetch_robots(url).await.map(Arc::new);
        self.cache.write().await.insert(key, group.clone());
        group
    }

    async fn fetch_robots(&self, url: &Url) -> Option<Robot> {
        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        let resp = match self.client.get(robots_url.as_str()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url = %robots_url, "robots.txt fetch failed: {e}");
                return None;
            }
        };
        if !resp.status().is_success() {
            debug!(url = %robots_url, status = %resp.status(), "no usable robots.txt");
            return None;
        }
        let body = resp.bytes().await.ok()?;

        match Robot::new(&self.user_agent, &body) {
            Ok(robot) => Some(robot),
            Err(e) => {
                debug!(url = %robots_url, "robots.txt parse failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROBOTS_BODY: &str = "User-agent: *\nDisallow: /private/\nCrawl-delay: 2\n";

    async fn policy() -> RobotsPolicy {
        RobotsPolicy::new("fledgling/1.0", RobotsPolicy::DEFAULT_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn test_disallowed_path_is_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS_BODY))
            .mount(&server)
            .await;

        let policy = policy().await;
        assert!(!policy.is_allowed(&format!("{}/private/page", server.uri())).await);
        assert!(policy.is_allowed(&format!("{}/public", server.uri())).await);
    }

    #[tokio::test]
    async fn test_crawl_delay_from_robots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS_BODY))
            .mount(&server)
            .await;

        let policy = policy().await;
        let delay = policy.crawl_delay(&format!("{}/anything", server.uri())).await;
        assert_eq!(delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_robots_is_permissive_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let policy = policy().await;
        let url = format!("{}/private/page", server.uri());
        assert!(policy.is_allowed(&url).await);
        // Second query hits the cached None instead of re-fetching.
        assert!(policy.is_allowed(&url).await);
        assert_eq!(policy.crawl_delay(&url).await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_malformed_url_is_permissive() {
        let policy = policy().await;
        assert!(policy.is_allowed("not a url").await);
        assert_eq!(policy.crawl_delay("not a url").await, Duration::ZERO);
    }
}
