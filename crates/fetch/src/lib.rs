mod coordinator;
mod retry;
mod web;

pub use coordinator::FetchCoordinator;
pub use retry::{backoff_for, RetryFetcher, DEFAULT_RETRIES};
pub use web::WebFetcher;
