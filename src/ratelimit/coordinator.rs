//! Quota check and check-and-increment protocol over a key-value store.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

use crate::store::{KeyValueStore, StoreError};

use super::record::{storage_key, RateLimitRecord};

/// A quota policy: which counter, how many requests, over what window.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Name scoping this quota's counters in the store
    pub limit_key: String,
    /// Maximum requests allowed per window
    pub max_requests: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl From<crate::config::PolicyConfig> for RateLimitPolicy {
    fn from(config: crate::config::PolicyConfig) -> Self {
        Self {
            limit_key: config.limit_key,
            max_requests: config.max_requests,
            window_ms: config.window_ms,
        }
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the request is within quota
    pub allowed: bool,
    /// When the current window ends, milliseconds since the Unix epoch
    pub resets_at: u64,
}

/// Coordinates quota decisions for `(limit_key, visitor_id)` pairs against
/// a shared key-value store.
///
/// The coordinator fails open: if the store cannot be reached, or a stored
/// value cannot be read back, the request is allowed with a window starting
/// now. A store outage must never lock visitors out.
///
/// Concurrent increments for the same visitor use an unguarded
/// read-modify-write sequence and can lose updates; the counter may
/// under-count under bursts. Accepted trade-off, see DESIGN.md.
pub struct RateLimitCoordinator {
    store: Arc<dyn KeyValueStore>,
}

impl RateLimitCoordinator {
    /// Create a coordinator over the given store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Read-only quota inspection. Never writes to the store, so any number
    /// of calls leaves subsequent decisions unchanged.
    pub async fn check_only(&self, visitor_id: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        let now_ms = epoch_ms();
        match self.load_effective(visitor_id, policy, now_ms).await {
            Ok(record) => {
                let decision = RateLimitDecision {
                    allowed: record.count < policy.max_requests,
                    resets_at: record.resets_at(policy.window_ms),
                };
                trace!(
                    visitor_id = %visitor_id,
                    count = record.count,
                    allowed = decision.allowed,
                    "Quota checked"
                );
                decision
            }
            Err(e) => self.fail_open(visitor_id, policy, now_ms, e),
        }
    }

    /// Consume one unit of quota if available.
    ///
    /// Over-limit requests are denied without writing; allowed requests
    /// persist the incremented record with a TTL of one window.
    pub async fn check_and_increment(
        &self,
        visitor_id: &str,
        policy: &RateLimitPolicy,
    ) -> RateLimitDecision {
        let now_ms = epoch_ms();
        match self.try_increment(visitor_id, policy, now_ms).await {
            Ok(decision) => decision,
            Err(e) => self.fail_open(visitor_id, policy, now_ms, e),
        }
    }

    /// Fetch the raw stored record for a visitor, if one exists and parses.
    /// Used by the debug surface; never consults the window.
    pub async fn peek_record(
        &self,
        visitor_id: &str,
        policy: &RateLimitPolicy,
    ) -> Option<RateLimitRecord> {
        let key = storage_key(&policy.limit_key, visitor_id);
        match self.store.get(&key).await {
            Ok(raw) => raw.as_deref().and_then(RateLimitRecord::decode),
            Err(e) => {
                warn!(visitor_id = %visitor_id, error = %e, "Store read failed during record peek");
                None
            }
        }
    }

    async fn try_increment(
        &self,
        visitor_id: &str,
        policy: &RateLimitPolicy,
        now_ms: u64,
    ) -> Result<RateLimitDecision, StoreError> {
        let record = self.load_effective(visitor_id, policy, now_ms).await?;
        let resets_at = record.resets_at(policy.window_ms);

        if record.count >= policy.max_requests {
            debug!(
                visitor_id = %visitor_id,
                limit_key = %policy.limit_key,
                count = record.count,
                "Rate limit exceeded"
            );
            return Ok(RateLimitDecision {
                allowed: false,
                resets_at,
            });
        }

        let updated = record.incremented();
        let encoded = updated
            .encode()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let key = storage_key(&policy.limit_key, visitor_id);
        self.store
            .set(&key, &encoded, Duration::from_millis(policy.window_ms))
            .await?;

        debug!(
            visitor_id = %visitor_id,
            limit_key = %policy.limit_key,
            count = updated.count,
            max_requests = policy.max_requests,
            "Quota consumed"
        );

        Ok(RateLimitDecision {
            allowed: true,
            resets_at,
        })
    }

    /// Read the stored record and evaluate it against the current window.
    /// Absent and malformed values both yield a fresh window.
    async fn load_effective(
        &self,
        visitor_id: &str,
        policy: &RateLimitPolicy,
        now_ms: u64,
    ) -> Result<RateLimitRecord, StoreError> {
        let key = storage_key(&policy.limit_key, visitor_id);
        let raw = self.store.get(&key).await?;
        let record = raw
            .as_deref()
            .and_then(RateLimitRecord::decode)
            .unwrap_or_else(|| RateLimitRecord::fresh(now_ms));
        Ok(record.effective(now_ms, policy.window_ms))
    }

    fn fail_open(
        &self,
        visitor_id: &str,
        policy: &RateLimitPolicy,
        now_ms: u64,
        error: StoreError,
    ) -> RateLimitDecision {
        warn!(
            visitor_id = %visitor_id,
            limit_key = %policy.limit_key,
            error = %error,
            "Store failure, failing open"
        );
        RateLimitDecision {
            allowed: true,
            resets_at: now_ms + policy.window_ms,
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    const WINDOW: u64 = 86_400_000;

    fn test_policy() -> RateLimitPolicy {
        RateLimitPolicy {
            limit_key: "tutorRateLimit".to_string(),
            max_requests: 5,
            window_ms: WINDOW,
        }
    }

    fn coordinator() -> (RateLimitCoordinator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (RateLimitCoordinator::new(store.clone()), store)
    }

    /// Store that refuses every operation, simulating an outage.
    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_five_increments_allowed_sixth_denied() {
        let (coordinator, _) = coordinator();
        let policy = test_policy();

        for _ in 0..5 {
            let decision = coordinator.check_and_increment("v1", &policy).await;
            assert!(decision.allowed);
        }

        let decision = coordinator.check_and_increment("v1", &policy).await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_denial_keeps_resets_at_unchanged() {
        let (coordinator, _) = coordinator();
        let policy = test_policy();

        let mut last_allowed = None;
        for _ in 0..5 {
            last_allowed = Some(coordinator.check_and_increment("v1", &policy).await);
        }

        let first_denied = coordinator.check_and_increment("v1", &policy).await;
        let second_denied = coordinator.check_and_increment("v1", &policy).await;

        assert_eq!(first_denied.resets_at, last_allowed.unwrap().resets_at);
        assert_eq!(first_denied.resets_at, second_denied.resets_at);
    }

    #[tokio::test]
    async fn test_check_only_never_mutates() {
        let (coordinator, _) = coordinator();
        let policy = test_policy();

        for _ in 0..10 {
            let decision = coordinator.check_only("v2", &policy).await;
            assert!(decision.allowed);
        }

        // All five increments must still be available afterwards.
        for _ in 0..5 {
            assert!(coordinator.check_and_increment("v2", &policy).await.allowed);
        }
        assert!(!coordinator.check_and_increment("v2", &policy).await.allowed);
    }

    #[tokio::test]
    async fn test_check_only_fresh_visitor_allowed() {
        let (coordinator, store) = coordinator();
        let policy = test_policy();

        let decision = coordinator.check_only("never-seen", &policy).await;
        assert!(decision.allowed);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_window_resets_count() {
        let (coordinator, store) = coordinator();
        let policy = test_policy();
        let now_ms = epoch_ms();

        // Exhausted quota from a window that ended long ago.
        let stale = RateLimitRecord {
            count: 5,
            window_start_ms: now_ms - 2 * WINDOW,
        };
        store
            .set(
                &storage_key(&policy.limit_key, "v1"),
                &stale.encode().unwrap(),
                Duration::from_millis(WINDOW),
            )
            .await
            .unwrap();

        let decision = coordinator.check_and_increment("v1", &policy).await;
        assert!(decision.allowed);

        let stored = coordinator.peek_record("v1", &policy).await.unwrap();
        assert_eq!(stored.count, 1);
        assert!(stored.window_start_ms >= now_ms);
    }

    #[tokio::test]
    async fn test_expired_window_check_only_resets_at_from_now() {
        let (coordinator, store) = coordinator();
        let policy = test_policy();
        let now_ms = epoch_ms();

        let stale = RateLimitRecord {
            count: 5,
            window_start_ms: now_ms - 2 * WINDOW,
        };
        store
            .set(
                &storage_key(&policy.limit_key, "v1"),
                &stale.encode().unwrap(),
                Duration::from_millis(WINDOW),
            )
            .await
            .unwrap();

        let decision = coordinator.check_only("v1", &policy).await;
        assert!(decision.allowed);
        // Effective window starts now, not at the stale record's start.
        assert!(decision.resets_at >= now_ms + WINDOW);

        // checkOnly must not have persisted the reset.
        let stored = coordinator.peek_record("v1", &policy).await.unwrap();
        assert_eq!(stored, stale);
    }

    #[tokio::test]
    async fn test_malformed_record_treated_as_fresh() {
        let (coordinator, store) = coordinator();
        let policy = test_policy();

        store
            .set(
                &storage_key(&policy.limit_key, "v1"),
                "{not valid json",
                Duration::from_millis(WINDOW),
            )
            .await
            .unwrap();

        let decision = coordinator.check_and_increment("v1", &policy).await;
        assert!(decision.allowed);

        let stored = coordinator.peek_record("v1", &policy).await.unwrap();
        assert_eq!(stored.count, 1);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let coordinator = RateLimitCoordinator::new(Arc::new(FailingStore));
        let policy = test_policy();
        let before = epoch_ms();

        let decision = coordinator.check_and_increment("v1", &policy).await;

        assert!(decision.allowed);
        assert!(decision.resets_at >= before + WINDOW);
        assert!(decision.resets_at <= epoch_ms() + WINDOW);
    }

    #[tokio::test]
    async fn test_visitors_have_independent_quotas() {
        let (coordinator, _) = coordinator();
        let policy = test_policy();

        for _ in 0..5 {
            coordinator.check_and_increment("v1", &policy).await;
        }
        assert!(!coordinator.check_and_increment("v1", &policy).await.allowed);
        assert!(coordinator.check_and_increment("v2", &policy).await.allowed);
    }

    #[tokio::test]
    async fn test_concurrent_increments_complete() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Arc::new(RateLimitCoordinator::new(store));
        let policy = test_policy();

        let a = {
            let coordinator = coordinator.clone();
            let policy = policy.clone();
            tokio::spawn(async move { coordinator.check_and_increment("v3", &policy).await })
        };
        let b = {
            let coordinator = coordinator.clone();
            let policy = policy.clone();
            tokio::spawn(async move { coordinator.check_and_increment("v3", &policy).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a.allowed);
        assert!(b.allowed);

        // The unguarded read-modify-write may lose one update, but the
        // stored count only ever moves forward and never overshoots.
        let stored = coordinator.peek_record("v3", &policy).await.unwrap();
        assert!(stored.count >= 1);
        assert!(stored.count <= 2);
    }
}
