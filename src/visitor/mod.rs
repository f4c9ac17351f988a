//! Visitor identity resolution.
//!
//! Produces a stable anonymous identity for an otherwise unauthenticated
//! client: a fingerprinting provider when it works, a deterministic locally
//! derived fallback when it does not. Resolution never fails.

mod fingerprint;
mod resolver;
mod storage;

pub use fingerprint::{DeviceSignals, FingerprintProvider, ProviderError};
pub use resolver::{
    ClientContext, IdentityOrigin, VisitorIdentity, VisitorResolver, DETACHED_VISITOR_ID,
};
pub use storage::{FileTokenStore, MemoryTokenStore, TokenStore};
