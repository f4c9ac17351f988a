//! Quota records and the check/check-and-increment protocol.

mod coordinator;
mod record;

pub use coordinator::{RateLimitCoordinator, RateLimitDecision, RateLimitPolicy};
pub use record::{storage_key, RateLimitRecord};
