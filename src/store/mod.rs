//! Key-value store backends.

mod backend;
mod memory;
mod redis;

pub use backend::{KeyValueStore, StoreError};
pub use memory::MemoryStore;
pub use redis::RedisStore;
