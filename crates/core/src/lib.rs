pub mod error;
pub mod types;
pub mod urls;

pub use error::CrawlError;
pub use types::*;
