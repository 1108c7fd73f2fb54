use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    /// Distinct sentinel: the queue had nothing to pop. Callers back off
    /// and retry instead of treating this as a failure.
    #[error("queue is empty")]
    QueueEmpty,

    #[error("operation cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected status code: {0}")]
    Status(u16),

    /// The status line and headers arrived but the body could not be read.
    /// Not retried: the target is logged and dropped, never dead-lettered.
    #[error("body read error: {0}")]
    BodyRead(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("coordination store error: {0}")]
    Store(String),

    #[error("blob store error: {0}")]
    Blob(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// Status-code label for metrics. "0" when the failure happened before
    /// any status line was read.
    pub fn status_label(&self) -> String {
        match self {
            CrawlError::Status(code) => code.to_string(),
            _ => "0".to_string(),
        }
    }

    /// Short error-class label for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            CrawlError::QueueEmpty => "queue empty",
            CrawlError::Cancelled => "cancelled",
            CrawlError::Network(_) => "network",
            CrawlError::Status(_) => "status",
            CrawlError::BodyRead(_) => "body read",
            CrawlError::InvalidUrl(_) => "invalid url",
            CrawlError::Parse(_) => "parse",
            CrawlError::Store(_) => "store",
            CrawlError::Blob(_) => "blob",
            CrawlError::Config(_) => "config",
            CrawlError::Other(_) => "other",
        }
    }
}
