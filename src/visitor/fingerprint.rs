//! Fingerprint provider seam and fallback token derivation.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;

/// Errors produced by a fingerprinting provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider failed, timed out, or has no runtime context
    #[error("fingerprint provider unavailable: {0}")]
    Unavailable(String),
}

/// Trait for device fingerprinting providers.
///
/// A provider derives a best-effort stable identifier from observable
/// device characteristics. Failure is expected and non-fatal: the resolver
/// degrades to a locally derived fallback identity.
#[async_trait]
pub trait FingerprintProvider: Send + Sync {
    /// Produce a stable identifier for the current device.
    async fn fingerprint(&self) -> Result<String, ProviderError>;
}

/// Locally observable, low-entropy device signals used to derive a
/// fallback identity when fingerprinting is unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSignals {
    pub screen_width: u32,
    pub screen_height: u32,
    pub timezone: String,
    pub language: String,
    pub platform: String,
    pub color_depth: u32,
    pub pixel_ratio: f64,
}

impl DeviceSignals {
    /// Canonical string form: identical signals always produce identical
    /// output, which keeps the derived token stable across invocations.
    pub fn canonical(&self) -> String {
        format!(
            "{}x{}-{}-{}-{}-{}-{}",
            self.screen_width,
            self.screen_height,
            self.timezone,
            self.language,
            self.platform,
            self.color_depth,
            self.pixel_ratio
        )
    }

    /// Deterministic fallback token for these signals.
    pub fn fallback_token(&self) -> String {
        format!("fallback-{}", signal_hash(&self.canonical()))
    }
}

/// Random token for devices where no signals or storage are usable.
pub fn random_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("fallback-{}", suffix.to_lowercase())
}

/// 31-multiplier string hash rendered in base36.
///
/// Low quality is fine here: the token only needs to be short, stable, and
/// cheap, not collision-resistant.
fn signal_hash(input: &str) -> String {
    let mut hash: i32 = 0;
    for c in input.chars() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(c as i32);
    }
    base36(u64::from(hash.unsigned_abs()))
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = String::new();
    while value > 0 {
        out.insert(0, DIGITS[(value % 36) as usize] as char);
        value /= 36;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signals() -> DeviceSignals {
        DeviceSignals {
            screen_width: 1920,
            screen_height: 1080,
            timezone: "Europe/Amsterdam".to_string(),
            language: "en-US".to_string(),
            platform: "Linux x86_64".to_string(),
            color_depth: 24,
            pixel_ratio: 1.0,
        }
    }

    #[test]
    fn test_canonical_layout() {
        assert_eq!(
            sample_signals().canonical(),
            "1920x1080-Europe/Amsterdam-en-US-Linux x86_64-24-1"
        );
    }

    #[test]
    fn test_fallback_token_deterministic() {
        let a = sample_signals().fallback_token();
        let b = sample_signals().fallback_token();
        assert_eq!(a, b);
        assert!(a.starts_with("fallback-"));
    }

    #[test]
    fn test_different_signals_different_tokens() {
        let mut other = sample_signals();
        other.screen_width = 1280;
        assert_ne!(sample_signals().fallback_token(), other.fallback_token());
    }

    #[test]
    fn test_random_tokens_are_distinct() {
        let a = random_token();
        let b = random_token();
        assert!(a.starts_with("fallback-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_base36_digits() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }
}
