//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Quota policy enforced by the rate-limit endpoint
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Admin key guarding the debug endpoints; unset disables them
    #[serde(default)]
    pub admin_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            admin_key: None,
        }
    }
}

fn default_http_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Remote store configuration.
///
/// When `url` is unset the service falls back to a process-local in-memory
/// store: quota decisions still work but are not shared across instances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL, e.g. `redis://127.0.0.1:6379`
    pub url: Option<String>,
}

/// Quota policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Name of the quota policy, scoping counters in the store
    #[serde(default = "default_limit_key")]
    pub limit_key: String,

    /// Maximum requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            limit_key: default_limit_key(),
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

fn default_limit_key() -> String {
    "tutorRateLimit".to_string()
}

fn default_max_requests() -> u64 {
    5
}

fn default_window_ms() -> u64 {
    24 * 60 * 60 * 1000
}

impl TollgateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TollgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TollgateError::Config(e.to_string()))?;
        Ok(config)
    }
}
