mod memory;
mod redis;

pub use memory::MemoryFrontier;
pub use redis::RedisFrontier;

/// Named lists and sets in the coordination store, shared by every service
/// instance.
pub const URL_QUEUE_KEY: &str = "crawler:queue";
pub const PARSE_QUEUE_KEY: &str = "crawler:parser_queue";
pub const DLQ_KEY: &str = "crawler:dlq";
pub const VISITED_KEY: &str = "crawler:visited";
