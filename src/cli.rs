use clap::{Args, Parser};

/// Coordination- and blob-store flags shared by both services.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Address of the coordination store
    #[arg(long, default_value = "localhost:6379")]
    pub redis_addr: String,

    /// Password of the coordination store
    #[arg(long, default_value = "")]
    pub redis_pass: String,

    /// Coordination store DB number
    #[arg(long, default_value_t = 0)]
    pub redis_db: i64,

    /// S3 endpoint URL
    #[arg(long, default_value = "http://localhost:9000")]
    pub s3_endpoint: String,

    /// S3 bucket name
    #[arg(long, default_value = "crawled-data")]
    pub s3_bucket: String,

    /// S3 region
    #[arg(long, default_value = "us-east-1")]
    pub s3_region: String,

    /// S3 access key / user
    #[arg(long, default_value = "admin")]
    pub s3_user: String,

    /// S3 secret key / password
    #[arg(long, default_value = "password")]
    pub s3_pass: String,
}

#[derive(Parser, Debug)]
#[command(name = "crawler", about = "Fetcher service: crawl websites from seed URLs")]
pub struct CrawlerCli {
    /// Comma-separated list of start URLs
    #[arg(long, value_delimiter = ',')]
    pub seed: Vec<String>,

    /// Number of fetch workers
    #[arg(long, default_value_t = 10)]
    pub workers: usize,

    /// Port for the metrics server
    #[arg(long, default_value_t = 9190)]
    pub metrics_port: u16,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Parser, Debug)]
#[command(name = "parser", about = "Parser service: extract and re-enqueue links")]
pub struct ParserCli {
    /// Number of parse workers
    #[arg(long, default_value_t = 10)]
    pub workers: usize,

    /// Port for the metrics server
    #[arg(long, default_value_t = 9191)]
    pub metrics_port: u16,

    /// Follow links onto other domains
    #[arg(long)]
    pub cross_domain: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}
