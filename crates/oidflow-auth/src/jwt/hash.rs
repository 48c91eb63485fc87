//! OIDC `c_hash` / `at_hash` computation
//!
//! Per OpenID Connect Core 1.0 §3.3.2.11: hash the ASCII octets of the value
//! with SHA-256, keep the left-most half of the digest, and base64url-encode
//! it without padding.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::crypto::{CryptoProvider, DefaultCryptoProvider};

/// Computes and checks left-half SHA-256 hashes
#[derive(Debug, Clone)]
pub struct HashChecker {
    crypto: Arc<dyn CryptoProvider>,
}

impl Default for HashChecker {
    fn default() -> Self {
        Self::new(Arc::new(DefaultCryptoProvider))
    }
}

impl HashChecker {
    /// Create a checker using `crypto` for digesting and encoding
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self { crypto }
    }

    /// SHA-256 digest of `content`
    pub fn compute_hash(&self, content: &str) -> Vec<u8> {
        self.crypto.sha256(content.as_bytes())
    }

    /// Encoded left-half hash of `content`, as it appears in a token claim
    pub fn encoded_hash(&self, content: &str) -> String {
        let digest = self.compute_hash(content);
        self.crypto.base64_url_encode(&digest[..digest.len() / 2])
    }

    /// Whether `hash_provided` is the left-half hash of `content`
    ///
    /// The comparison runs in constant time over equal-length inputs.
    pub fn check_hash(&self, content: &str, hash_provided: &str) -> bool {
        let expected = self.encoded_hash(content);
        expected.as_bytes().ct_eq(hash_provided.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use proptest::prelude::*;
    use sha2::{Digest, Sha256};

    // Access token and code from OpenID Connect Core 1.0, Appendix A.3 and A.4
    #[test]
    fn test_oidc_core_vectors() {
        let checker = HashChecker::default();
        assert!(checker.check_hash("jHkWEdUXMU1BwAsC4vtUsZwnNGZ6Zb3T", "ZjE-HpaWow_AtWOSXgPB0w"));
        assert!(checker.check_hash(
            "Qcb0Orv1zh30vL1MPRsbm-diHiMwcLyZvn1arpZv-Jxf_11jnpEX3Tgfvk",
            "LDktKdoQak3Pk0cnXxCltA"
        ));
    }

    #[test]
    fn test_mismatch_and_length_differences() {
        let checker = HashChecker::default();
        let hash = checker.encoded_hash("some-code");
        assert!(checker.check_hash("some-code", &hash));
        assert!(!checker.check_hash("other-code", &hash));
        assert!(!checker.check_hash("some-code", &hash[..hash.len() - 1]));
        assert!(!checker.check_hash("some-code", ""));
    }

    #[test]
    fn test_digest_is_full_sha256() {
        let checker = HashChecker::default();
        assert_eq!(checker.compute_hash("abc").len(), 32);
    }

    proptest! {
        #[test]
        fn prop_check_hash_matches_reference(content in "[ -~]{1,64}") {
            let digest = Sha256::digest(content.as_bytes());
            let reference = URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]);
            let checker = HashChecker::default();
            prop_assert!(checker.check_hash(&content, &reference));
            let tampered = format!("{reference}A");
            prop_assert!(!checker.check_hash(&content, &tampered));
        }
    }
}
