use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fledgling_core::{CrawlError, FetchResult, Fetcher};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 32;

/// Single-shot page fetcher: one GET with a bounded timeout, success only
/// on 2xx with a fully read body.
pub struct WebFetcher {
    client: reqwest::Client,
}

impl WebFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| CrawlError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for WebFetcher {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> Result<FetchResult, CrawlError> {
        debug!(url, "fetching");

        let request = async {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| CrawlError::Network(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(CrawlError::Status(status.as_u16()));
            }

            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            let body = resp
                .bytes()
                .await
                .map_err(|e| CrawlError::BodyRead(e.to_string()))?;

            Ok(FetchResult {
                status: status.as_u16(),
                content_type,
                body: body.to_vec(),
            })
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(CrawlError::Cancelled),
            result = request => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> WebFetcher {
        WebFetcher::new("fledgling/1.0", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_body_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", "fledgling/1.0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html>hi</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let result = fetcher()
            .fetch(&cancel, &format!("{}/page", server.uri()))
            .await
            .unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(result.content_type.as_deref(), Some("text/html"));
        assert_eq!(result.body, b"<html>hi</html>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let err = fetcher().fetch(&cancel, &server.uri()).await.unwrap_err();
        assert!(matches!(err, CrawlError::Status(500)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let cancel = CancellationToken::new();
        // reserved TEST-NET address, nothing listens there
        let err = fetcher()
            .fetch(&cancel, "http://192.0.2.1:9/x")
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Network(_)));
    }

    #[tokio::test]
    async fn test_cancelled_fetch_returns_promptly() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fetcher()
            .fetch(&cancel, "http://192.0.2.1:9/x")
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Cancelled));
    }
}
