//! Session token generation
//!
//! Tokens are 256 bits drawn from the operating system CSPRNG and encoded
//! as unpadded URL-safe base64. There is no counter or time component.

use crate::error::{SessionError, Result};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::sync::Arc;

/// Number of random bytes in a token
pub const TOKEN_BYTES: usize = 32;

/// Length of an encoded token (43 chars for 32 bytes)
pub const TOKEN_LEN: usize = (TOKEN_BYTES * 4 + 2) / 3;

/// Source of cryptographically secure random bytes
pub trait EntropySource: Send + Sync {
    /// Fill `buf` entirely or fail; partial fills are never acceptable
    fn fill(&self, buf: &mut [u8]) -> Result<()>;
}

/// Operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        let mut rng = OsRng;
        rng.try_fill_bytes(buf)
            .map_err(|e| SessionError::Entropy(e.to_string()))
    }
}

/// Generates session tokens from an entropy source
#[derive(Clone)]
pub struct IdGenerator {
    source: Arc<dyn EntropySource>,
}

impl IdGenerator {
    /// Create a generator backed by the OS CSPRNG
    pub fn new() -> Self {
        Self::with_source(OsEntropy)
    }

    /// Create a generator with a custom entropy source
    pub fn with_source(source: impl EntropySource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Produce a fresh token
    pub fn generate(&self) -> Result<String> {
        let mut buf = [0u8; TOKEN_BYTES];
        self.source.fill(&mut buf)?;
        Ok(URL_SAFE_NO_PAD.encode(buf))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

/// Check that a client-supplied token has the shape this generator emits
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Short token prefix safe to put in logs
pub(crate) fn redact(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct ExhaustedEntropy;

    impl EntropySource for ExhaustedEntropy {
        fn fill(&self, _buf: &mut [u8]) -> Result<()> {
            Err(SessionError::Entropy("pool exhausted".to_string()))
        }
    }

    #[test]
    fn test_token_shape() {
        let token = IdGenerator::new().generate().unwrap();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(is_well_formed(&token));
        assert!(!token.contains('='));
    }

    #[test]
    fn test_tokens_unique() {
        let ids = IdGenerator::new();
        let tokens: HashSet<String> = (0..10_000).map(|_| ids.generate().unwrap()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_entropy_failure_is_hard_error() {
        let ids = IdGenerator::with_source(ExhaustedEntropy);
        let err = ids.generate().unwrap_err();
        assert!(matches!(err, SessionError::Entropy(_)));
    }

    #[test]
    fn test_is_well_formed_rejects_garbage() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("short"));
        assert!(!is_well_formed(&"a".repeat(TOKEN_LEN + 1)));
        assert!(!is_well_formed(&format!("{}=", "a".repeat(TOKEN_LEN - 1))));
        assert!(!is_well_formed(&format!("{}/", "a".repeat(TOKEN_LEN - 1))));
        assert!(is_well_formed(&format!("{}b", "a-_".repeat(14))));
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("abcdefghijkl"), "abcdefgh");
        assert_eq!(redact("abc"), "abc");
    }
}
