mod memory;
mod s3;

pub use crate::s3::{S3Config, S3Store};
pub use memory::MemoryStore;
