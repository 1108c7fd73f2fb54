use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use fledgling::bootstrap::{self, FETCH_RETRIES, FETCH_TIMEOUT, USER_AGENT};
use fledgling::cli::CrawlerCli;
use fledgling_core::Frontier;
use fledgling_fetch::{FetchCoordinator, RetryFetcher, WebFetcher};
use fledgling_frontier::RedisFrontier;
use fledgling_limiter::RedisRateLimiter;
use fledgling_metrics::CrawlMetrics;
use fledgling_robots::RobotsPolicy;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CrawlerCli::parse();
    bootstrap::init_tracing("crawler");

    let (coord, blob) = bootstrap::connect_stores(&cli.store).await?;
    let metrics = Arc::new(CrawlMetrics::new()?);

    let frontier: Arc<dyn Frontier> = Arc::new(RedisFrontier::new(coord.clone()));
    let limiter = Arc::new(RedisRateLimiter::new(coord.clone()));
    let robots = Arc::new(RobotsPolicy::new(USER_AGENT, RobotsPolicy::DEFAULT_TIMEOUT)?);
    let base = Arc::new(WebFetcher::new(USER_AGENT, FETCH_TIMEOUT)?);
    let fetcher = Arc::new(RetryFetcher::new(base, FETCH_RETRIES));

    if !cli.seed.is_empty() {
        info!(seeds = ?cli.seed, "seeding frontier");
        frontier.push(&cli.seed, 0).await?;
    }

    let cancel = bootstrap::shutdown_token();
    bootstrap::spawn_metrics(Arc::clone(&metrics), coord, cli.metrics_port, &cancel);

    let coordinator = Arc::new(FetchCoordinator::new(
        frontier,
        fetcher,
        limiter,
        blob,
        robots,
        metrics,
        cli.workers,
    ));

    info!(workers = cli.workers, "starting fetcher service");
    coordinator.run(cancel).await;

    info!("shutdown complete");
    Ok(())
}
