//! Quota record codec.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-visitor quota counter as stored in the key-value store.
///
/// Wire format is `{"count": <int>, "timestamp": <epoch-ms>}` where
/// `timestamp` is the start of the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// Requests consumed in the current window
    pub count: u64,
    /// Window start, milliseconds since the Unix epoch
    #[serde(rename = "timestamp")]
    pub window_start_ms: u64,
}

impl RateLimitRecord {
    /// A fresh record: no requests consumed, window starting now.
    pub fn fresh(now_ms: u64) -> Self {
        Self {
            count: 0,
            window_start_ms: now_ms,
        }
    }

    /// Decode a stored value, or `None` for input that is not a valid
    /// record. Malformed data is logged and treated as absent; this path
    /// never errors.
    pub fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Discarding malformed rate limit record");
                None
            }
        }
    }

    /// Encode the record for storage.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether the window this record belongs to has expired at `now_ms`.
    pub fn is_expired(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) > window_ms
    }

    /// The record as it should be evaluated at `now_ms`: unchanged while
    /// the window is live, reset to a fresh window once it has expired.
    pub fn effective(self, now_ms: u64, window_ms: u64) -> Self {
        if self.is_expired(now_ms, window_ms) {
            Self::fresh(now_ms)
        } else {
            self
        }
    }

    /// When the current window ends and the count resets.
    pub fn resets_at(&self, window_ms: u64) -> u64 {
        self.window_start_ms + window_ms
    }

    /// One consumed request added to this record.
    pub fn incremented(self) -> Self {
        Self {
            count: self.count + 1,
            ..self
        }
    }
}

/// Storage key for a quota record: `ratelimit:<limitKey>:<visitorId>`.
pub fn storage_key(limit_key: &str, visitor_id: &str) -> String {
    format!("ratelimit:{}:{}", limit_key, visitor_id)
}
