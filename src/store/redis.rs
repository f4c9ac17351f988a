//! Redis-backed key-value store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::{KeyValueStore, StoreError};

/// Remote store backed by Redis.
///
/// Uses a `ConnectionManager`, which transparently reconnects after
/// transient failures. Individual command failures are still surfaced to
/// the caller as `StoreError::Unavailable`.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at the given URL.
    ///
    /// Fails fast on an unparseable URL or an unreachable server so that
    /// misconfiguration is caught at startup rather than on first request.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        debug!(url = %url, "Connected to Redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(|e| {
            warn!(key = %key, error = %e, "Redis GET failed");
            StoreError::Unavailable(e.to_string())
        })?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        // Redis expiry has one-second resolution; round up so a record
        // never expires before its window ends.
        let ttl_secs = ttl.as_millis().div_ceil(1000).max(1) as u64;

        let _: () = conn.set_ex(key, value, ttl_secs).await.map_err(|e| {
            warn!(key = %key, error = %e, "Redis SET failed");
            StoreError::Unavailable(e.to_string())
        })?;
        Ok(())
    }
}
