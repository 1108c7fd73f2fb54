use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use fledgling_core::{CrawlError, FetchResult, Fetcher};

pub const DEFAULT_RETRIES: u32 = 3;

const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(32);

/// Capped exponential backoff for one attempt index:
/// `min(1s * 2^attempt, 32s)` plus up to half of that again as jitter.
/// Deterministic for a given RNG state.
pub fn backoff_for(attempt: u32, rng: &mut impl Rng) -> Duration {
    let exp = BASE_BACKOFF.as_secs_f64() * 2f64.powi(attempt.min(31) as i32);
    let capped = exp.min(MAX_BACKOFF.as_secs_f64());
    let jitter = rng.gen::<f64>() * capped * 0.5;
    Duration::from_secs_f64(capped + jitter)
}

/// Wraps any fetcher with bounded retries. Surfaces the last error after
/// exhaustion; backoff waits abort promptly on cancellation.
pub struct RetryFetcher {
    base: Arc<dyn Fetcher>,
    retries: u32,
    rng: Mutex<SmallRng>,
}

impl RetryFetcher {
    pub fn new(base: Arc<dyn Fetcher>, retries: u32) -> Self {
        Self {
            base,
            retries,
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    /// Seeded variant so tests see a deterministic backoff schedule.
    pub fn with_seed(base: Arc<dyn Fetcher>, retries: u32, seed: u64) -> Self {
        Self {
            base,
            retries,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl Fetcher for RetryFetcher {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> Result<FetchResult, CrawlError> {
        let mut last_err = CrawlError::Network("no fetch attempts made".into());

        for attempt in 0..self.retries {
            match self.base.fetch(cancel, url).await {
                Ok(result) => return Ok(result),
                Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
                // A broken body behind a good status line is not retried;
                // the caller logs and drops the target.
                Err(e @ CrawlError::BodyRead(_)) => return Err(e),
                Err(e) => {
                    warn!(url, attempt, "fetch attempt failed: {e}");
                    last_err = e;
                }
            }

            if attempt + 1 == self.retries {
                break;
            }

            let pause = {
                let mut rng = self.rng.lock().await;
                backoff_for(attempt, &mut *rng)
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                _ = sleep(pause) => {}
            }
        }

        Err(last_err)
    }
}
