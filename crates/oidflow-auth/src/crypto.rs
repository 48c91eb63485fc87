//! Crypto provider
//!
//! Digest, encoding and random-value primitives used by the request builders
//! and by [`HashChecker`](crate::jwt::HashChecker). Signature verification is
//! handled by `jsonwebtoken` and is not part of this trait.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use oauth2::PkceCodeChallenge;
use sha2::{Digest, Sha256};

/// PKCE verifier/challenge pair (RFC 7636, S256)
#[derive(Clone)]
pub struct PkceCodes {
    /// Code verifier, kept by the caller until the code is redeemed
    pub verifier: String,
    /// S256 challenge sent on the authorization URL
    pub challenge: String,
}

impl std::fmt::Debug for PkceCodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceCodes")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Cryptographic primitives supplied to the client
pub trait CryptoProvider: Send + Sync + std::fmt::Debug {
    /// New random GUID (used for correlation ids, state and nonce values)
    fn create_new_guid(&self) -> String;

    /// SHA-256 digest of `data`
    fn sha256(&self, data: &[u8]) -> Vec<u8>;

    /// base64url encoding without padding
    fn base64_url_encode(&self, data: &[u8]) -> String;

    /// base64url decoding; accepts input with or without padding
    fn base64_url_decode(&self, data: &str) -> Option<Vec<u8>>;

    /// Fresh PKCE codes
    fn generate_pkce_codes(&self) -> PkceCodes;
}

/// Default provider built on `uuid`, `sha2`, `base64` and oauth2's PKCE helper
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCryptoProvider;

impl CryptoProvider for DefaultCryptoProvider {
    fn create_new_guid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn sha256(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().to_vec()
    }

    fn base64_url_encode(&self, data: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(data)
    }

    fn base64_url_decode(&self, data: &str) -> Option<Vec<u8>> {
        URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()
    }

    fn generate_pkce_codes(&self) -> PkceCodes {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        PkceCodes {
            verifier: verifier.secret().to_string(),
            challenge: challenge.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_is_unique() {
        let crypto = DefaultCryptoProvider;
        let a = crypto.create_new_guid();
        let b = crypto.create_new_guid();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_base64_url_roundtrip_tolerates_padding() {
        let crypto = DefaultCryptoProvider;
        let encoded = crypto.base64_url_encode(b"{\"uid\":\"1\"}");
        assert!(!encoded.contains('='));
        assert_eq!(
            crypto.base64_url_decode(&format!("{encoded}==")).unwrap(),
            b"{\"uid\":\"1\"}"
        );
        assert!(crypto.base64_url_decode("***").is_none());
    }

    #[test]
    fn test_pkce_challenge_is_s256_of_verifier() {
        let crypto = DefaultCryptoProvider;
        let codes = crypto.generate_pkce_codes();
        let expected = crypto.base64_url_encode(&crypto.sha256(codes.verifier.as_bytes()));
        assert_eq!(codes.challenge, expected);
    }
}
