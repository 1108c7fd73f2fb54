use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use fledgling::bootstrap;
use fledgling::cli::ParserCli;
use fledgling_core::Frontier;
use fledgling_frontier::RedisFrontier;
use fledgling_metrics::CrawlMetrics;
use fledgling_parser::{HtmlParser, ParseCoordinator};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ParserCli::parse();
    bootstrap::init_tracing("parser");

    let (coord, blob) = bootstrap::connect_stores(&cli.store).await?;
    let metrics = Arc::new(CrawlMetrics::new()?);

    let frontier: Arc<dyn Frontier> = Arc::new(RedisFrontier::new(coord.clone()));

    let cancel = bootstrap::shutdown_token();
    bootstrap::spawn_metrics(Arc::clone(&metrics), coord, cli.metrics_port, &cancel);

    let coordinator = Arc::new(ParseCoordinator::new(
        frontier,
        blob,
        Arc::new(HtmlParser::new()),
        metrics,
        cli.workers,
        cli.cross_domain,
    ));

    info!(workers = cli.workers, cross_domain = cli.cross_domain, "starting parser service");
    coordinator.run(cancel).await;

    info!("shutdown complete");
    Ok(())
}
