//! Common test utilities for integration tests
//!
//! A wiremock identity provider serving discovery, JWKS, token and device
//! code endpoints, plus an RSA key pair for minting tokens.

#![allow(dead_code)]

use std::sync::OnceLock;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use oidflow_auth::network::{NetworkRequestOptions, NetworkResponse};
use oidflow_auth::{NetworkError, NetworkModule};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "test-client";
pub const KID: &str = "test-key-1";

/// RSA key pair shared by every test in a binary
pub struct TestKey {
    pub private_pem: String,
    pub public_pem: String,
    pub jwk: Value,
}

pub fn test_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
            .expect("Failed to generate RSA key");
        let public = RsaPublicKey::from(&private);
        TestKey {
            private_pem: private
                .to_pkcs1_pem(LineEnding::LF)
                .expect("Failed to encode private key")
                .as_str()
                .to_owned(),
            public_pem: public
                .to_pkcs1_pem(LineEnding::LF)
                .expect("Failed to encode public key"),
            jwk: json!({
                "kty": "RSA",
                "kid": KID,
                "use": "sig",
                "alg": "RS256",
                "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
            }),
        }
    })
}

pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Sign `claims` with the test key (RS256, `typ: JWT`, `kid` set)
pub fn sign(claims: &Value) -> String {
    sign_with_header(claims, header(Some(KID)))
}

pub fn header(kid: Option<&str>) -> Header {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    header
}

pub fn sign_with_header(claims: &Value, header: Header) -> String {
    let key = EncodingKey::from_rsa_pem(test_key().private_pem.as_bytes())
        .expect("Failed to load signing key");
    encode(&header, claims, &key).expect("Failed to sign JWT")
}

/// Standard claims valid for the next hour
pub fn claims(issuer: &str, audience: &str) -> Value {
    let now = current_timestamp();
    json!({
        "iss": issuer,
        "aud": audience,
        "sub": "user-123",
        "iat": now,
        "nbf": now - 10,
        "exp": now + 3600,
    })
}

/// Mock OpenID provider
pub struct MockIdentityProvider {
    pub server: MockServer,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Authority (and issuer) URL, with trailing slash
    pub fn authority(&self) -> String {
        format!("{}/", self.server.uri())
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    pub async fn mock_discovery(&self) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": self.authority(),
                "authorization_endpoint": self.url("/authorize"),
                "token_endpoint": self.url("/token"),
                "device_authorization_endpoint": self.url("/devicecode"),
                "jwks_uri": self.url("/jwks"),
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_jwks(&self) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "keys": [test_key().jwk] })),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_token(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_token_error(&self, error: &str, description: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": error,
                "error_description": description,
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_device_code(&self) {
        Mock::given(method("POST"))
            .and(path("/devicecode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "device-code-1",
                "user_code": "WXYZ-1234",
                "verification_uri": self.url("/device"),
                "expires_in": 900,
                "interval": 1,
                "message": "Enter WXYZ-1234 to sign in",
            })))
            .mount(&self.server)
            .await;
    }

    /// Signed id token for this provider's issuer
    pub fn id_token(&self, extra: Value) -> String {
        let mut claims = claims(&self.authority(), CLIENT_ID);
        claims["preferred_username"] = json!("user@example.com");
        claims["tid"] = json!("tenant-1");
        if let (Some(claims), Some(extra)) = (claims.as_object_mut(), extra.as_object()) {
            claims.extend(extra.clone());
        }
        sign(&claims)
    }

    /// Number of requests received on `path`
    pub async fn requests_to(&self, path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == path)
            .count()
    }
}

/// Network module that fails the test on any request
#[derive(Debug, Default)]
pub struct PanicNetwork;

#[async_trait]
impl NetworkModule for PanicNetwork {
    async fn send_get_request(
        &self,
        url: &str,
        _options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError> {
        panic!("unexpected GET {url}");
    }

    async fn send_post_request(
        &self,
        url: &str,
        _options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError> {
        panic!("unexpected POST {url}");
    }
}

/// Left half of SHA-256, base64url (the `c_hash` / `at_hash` encoding)
pub fn oidc_hash(value: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}
