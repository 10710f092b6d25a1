//! Outstanding challenge bookkeeping.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::Rng as _;

/// Challenge tokens are 32 lowercase hex characters.
const TOKEN_LEN: usize = 32;
const TOKEN_ALPHABET: &[u8] = b"0123456789abcdef";

/// Maps a domain to its currently expected challenge token.
///
/// At most one token per domain: re-issuing replaces the earlier one. A
/// record exists exactly while a domain has an outstanding, unconsumed
/// challenge. Entries never expire on their own; only a successful
/// validation removes them.
///
/// The map is guarded internally and never exposed. The lock is held only
/// for the lookup or mutation itself, never across a DNS round trip or a
/// signing operation.
#[derive(Debug, Default)]
pub struct ChallengeRegistry {
    pending: Mutex<HashMap<String, String>>,
}

impl ChallengeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh token for `domain`, replacing any prior unconsumed
    /// token, and return it.
    pub fn issue(&self, domain: &str) -> String {
        let token = random_token();
        self.pending
            .lock()
            .insert(domain.to_owned(), token.clone());
        token
    }

    /// Compare `candidate` against the stored token for `domain`.
    ///
    /// On a byte-for-byte match the record is deleted and `true` is
    /// returned. On a mismatch, or when no record exists, the registry is
    /// left untouched and `false` is returned, so the same token stays
    /// valid for another attempt.
    pub fn consume(&self, domain: &str, candidate: &str) -> bool {
        let mut pending = self.pending.lock();
        match pending.get(domain) {
            Some(token) if token == candidate => {
                pending.remove(domain);
                true
            }
            _ => false,
        }
    }
}

/// Random 32 character lowercase hex string.
fn random_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let registry = ChallengeRegistry::new();
        let token = registry.issue("example.test");
        assert_eq!(token.len(), 32);
        assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_reissue_overwrites() {
        let registry = ChallengeRegistry::new();
        let first = registry.issue("example.test");
        let second = registry.issue("example.test");
        assert_ne!(first, second);

        // The old token no longer validates; the new one does.
        assert!(!registry.consume("example.test", &first));
        assert!(registry.consume("example.test", &second));
    }

    #[test]
    fn test_consume_is_single_use() {
        let registry = ChallengeRegistry::new();
        let token = registry.issue("example.test");
        assert!(registry.consume("example.test", &token));
        assert!(!registry.consume("example.test", &token));
    }

    #[test]
    fn test_mismatch_leaves_record_outstanding() {
        let registry = ChallengeRegistry::new();
        let token = registry.issue("example.test");
        assert!(!registry.consume("example.test", "00000000000000000000000000000000"));
        // Still valid after the failed attempt.
        assert!(registry.consume("example.test", &token));
    }

    #[test]
    fn test_unknown_domain_never_matches() {
        let registry = ChallengeRegistry::new();
        assert!(!registry.consume("nobody.test", "anything"));
    }

    #[test]
    fn test_domains_are_independent() {
        let registry = ChallengeRegistry::new();
        let a = registry.issue("a.test");
        let b = registry.issue("b.test");
        assert!(registry.consume("a.test", &a));
        assert!(registry.consume("b.test", &b));
    }
}
