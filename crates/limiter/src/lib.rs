use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fledgling_coord::{CoordStore, KeyTtl};
use fledgling_core::{CrawlError, RateLimiter};

/// Floor for per-host spacing; guards against misconfigured callers asking
/// for runaway rates.
const MIN_DELAY: Duration = Duration::from_millis(100);

/// Pause when the token key exists but reports no usable TTL.
const CONTENTION_FALLBACK: Duration = Duration::from_secs(1);

/// Distributed per-host rate limiter: a single TTL-bearing token key per
/// host in the coordination store. Every fetcher worker across every
/// instance contends for the same key; its expiry yields the minimum
/// inter-fetch spacing.
pub struct RedisRateLimiter {
    store: CoordStore,
}

impl RedisRateLimiter {
    pub fn new(store: CoordStore) -> Self {
        Self { store }
    }

    fn key_for(host: &str) -> String {
        format!("rl:{host}")
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn wait(
        &self,
        cancel: &CancellationToken,
        host: &str,
        delay: Duration,
    ) -> Result<(), CrawlError> {
        let delay = clamp_delay(delay);
        let key = Self::key_for(host);

        loop {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            if self.store.set_nx_ttl(&key, "1", delay).await? {
                return Ok(());
            }

            let pause = match self.store.pttl(&key).await? {
                KeyTtl::Missing | KeyTtl::NoExpiry => CONTENTION_FALLBACK,
                // Sleep past the holder's expiry; jitter spreads out
                // contending workers so they don't all wake at once.
                KeyTtl::Remaining(ttl) => {
                    ttl + jitter_within(ttl / 10, &mut rand::thread_rng())
                }
            };
            debug!(host, pause_ms = pause.as_millis() as u64, "host token held, waiting");

            tokio::select! {
                _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                _ = sleep(pause) => {}
            }
        }
    }
}

fn clamp_delay(delay: Duration) -> Duration {
    delay.max(MIN_DELAY)
}

/// Uniform jitter in [0, bound). Zero when the bound is sub-millisecond.
fn jitter_within(bound: Duration, rng: &mut impl Rng) -> Duration {
    let bound_ms = bound.as_millis() as u64;
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.gen_range(0..bound_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_clamp_delay_floor() {
        assert_eq!(clamp_delay(Duration::from_millis(10)), MIN_DELAY);
        assert_eq!(clamp_delay(Duration::ZERO), MIN_DELAY);
        assert_eq!(clamp_delay(Duration::from_secs(2)), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_below_bound() {
        let mut rng = SmallRng::seed_from_u64(7);
        let bound = Duration::from_millis(200);
        for _ in 0..1000 {
            assert!(jitter_within(bound, &mut rng) < bound);
        }
    }

    #[test]
    fn test_jitter_zero_bound() {
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(jitter_within(Duration::ZERO, &mut rng), Duration::ZERO);
        assert_eq!(
            jitter_within(Duration::from_micros(300), &mut rng),
            Duration::ZERO
        );
    }

    #[test]
    fn test_rate_limit_key_is_namespaced() {
        assert_eq!(RedisRateLimiter::key_for("example.com"), "rl:example.com");
    }
}
