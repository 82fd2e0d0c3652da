//! Provider credential secrets
//!
//! Provides:
//! - A redacting wrapper so API keys never reach logs or Debug output
//! - Stable short fingerprints for correlating a credential across log lines

use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept in a fingerprint
const FINGERPRINT_LEN: usize = 12;

/// An API key (or equivalent bearer secret) for one provider
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for building the outbound request only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 fingerprint that identifies the secret without revealing it
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", self.fingerprint())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", self.fingerprint())
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret::new(value)
    }
}

/// Hash a secret into a short hex fingerprint
pub fn fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_secret() {
        let secret = Secret::new("AIzaSy-super-secret");
        let rendered = format!("{:?} {}", secret, secret);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains(&secret.fingerprint()));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_blank_detection() {
        assert!(Secret::new("   ").is_blank());
        assert!(!Secret::new("k").is_blank());
    }
}
