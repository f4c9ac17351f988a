//! Stable anonymous identity resolution.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::fingerprint::{random_token, DeviceSignals, FingerprintProvider};
use super::storage::TokenStore;

/// Identity returned when the resolver runs outside any client execution
/// context. Never persisted and never fed to the fingerprinting provider.
pub const DETACHED_VISITOR_ID: &str = "fallback-detached";

/// How a visitor identity was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityOrigin {
    /// Produced by the fingerprinting provider
    Fingerprinted,
    /// Derived locally after provider failure
    Fallback,
}

/// A stable anonymous identity for the current client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitorIdentity {
    /// Opaque identifier, stable across sessions for the same device
    pub id: String,
    /// How the identifier was obtained
    pub origin: IdentityOrigin,
}

/// Observable client environment the resolver can draw on.
pub struct ClientContext {
    /// Device signals for deterministic fallback derivation
    pub signals: DeviceSignals,
    /// Durable storage for the fallback token; `None` degrades to a
    /// random token on each fallback resolution
    pub token_store: Option<Arc<dyn TokenStore>>,
}

/// Resolves and caches the visitor identity for the process lifetime.
///
/// `resolve` is idempotent and infallible. Concurrent first calls collapse
/// into a single provider attempt: all callers await one shared
/// initialization rather than racing their own.
pub struct VisitorResolver {
    provider: Arc<dyn FingerprintProvider>,
    context: Option<ClientContext>,
    identity: OnceCell<VisitorIdentity>,
}

impl VisitorResolver {
    /// Create a resolver for the given provider and client context.
    pub fn new(provider: Arc<dyn FingerprintProvider>, context: ClientContext) -> Self {
        Self {
            provider,
            context: Some(context),
            identity: OnceCell::new(),
        }
    }

    /// Create a resolver with no client execution context. Resolution
    /// yields the tagged placeholder identity without touching the
    /// provider or any storage.
    pub fn detached(provider: Arc<dyn FingerprintProvider>) -> Self {
        Self {
            provider,
            context: None,
            identity: OnceCell::new(),
        }
    }

    /// Resolve the visitor identity, reusing the cached value after the
    /// first successful resolution.
    pub async fn resolve(&self) -> VisitorIdentity {
        self.identity
            .get_or_init(|| self.resolve_once())
            .await
            .clone()
    }

    async fn resolve_once(&self) -> VisitorIdentity {
        let Some(context) = &self.context else {
            debug!("No client context, using detached placeholder identity");
            return VisitorIdentity {
                id: DETACHED_VISITOR_ID.to_string(),
                origin: IdentityOrigin::Fallback,
            };
        };

        match self.provider.fingerprint().await {
            Ok(id) => {
                debug!(visitor_id = %id, "Resolved fingerprinted identity");
                VisitorIdentity {
                    id,
                    origin: IdentityOrigin::Fingerprinted,
                }
            }
            Err(e) => {
                warn!(error = %e, "Fingerprinting failed, deriving fallback identity");
                fallback_identity(context)
            }
        }
    }
}

/// Derive the fallback identity: a previously persisted token if one
/// exists, a deterministic signal-derived token persisted for reuse
/// otherwise, and a random token when storage is unusable.
fn fallback_identity(context: &ClientContext) -> VisitorIdentity {
    let id = match &context.token_store {
        Some(store) => match store.load() {
            Ok(Some(token)) => token,
            Ok(None) => {
                let token = context.signals.fallback_token();
                if let Err(e) = store.store(&token) {
                    warn!(error = %e, "Failed to persist fallback token");
                }
                token
            }
            Err(e) => {
                warn!(error = %e, "Token storage unreadable, using random fallback token");
                random_token()
            }
        },
        None => random_token(),
    };

    VisitorIdentity {
        id,
        origin: IdentityOrigin::Fallback,
    }
}
