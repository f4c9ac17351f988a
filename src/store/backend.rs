//! Key-value store trait for abstracting remote and in-memory backends.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by a key-value store backend.
///
/// Every backend failure collapses into `Unavailable`: callers only ever
/// need to know that the store could not answer, not why.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or did not answer in time
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for key-value store implementations.
///
/// This trait abstracts over the remote `RedisStore` and the in-process
/// `MemoryStore` so the rate-limit coordinator can work with either. Both
/// operations are best-effort network calls that may fail or time out.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key` with a native expiry of `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}
