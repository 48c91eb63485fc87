//! Validation configuration and the per-call parameters derived from it

use std::time::Duration;

use jsonwebtoken::Algorithm;
use jsonwebtoken::jwk::Jwk;

use crate::error::ConfigurationError;

/// Algorithms accepted when the caller lists none
pub const DEFAULT_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::ES256, Algorithm::PS256];

/// Token type expected when the caller lists none
pub const DEFAULT_TOKEN_TYPE: &str = "JWT";

/// Statically supplied verification key
#[derive(Debug, Clone)]
pub enum SigningKey {
    /// A JSON Web Key
    Jwk(Jwk),
    /// PEM-encoded RSA public key
    RsaPem {
        /// Key id matched against the token's `kid`
        kid: Option<String>,
        /// PEM document
        pem: String,
    },
    /// PEM-encoded EC public key
    EcPem {
        /// Key id matched against the token's `kid`
        kid: Option<String>,
        /// PEM document
        pem: String,
    },
}

/// Caller-facing validation policy
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Accepted issuers; at least one non-empty entry is required
    pub valid_issuers: Vec<String>,
    /// Accepted audiences; at least one non-empty entry is required
    pub valid_audiences: Vec<String>,
    /// Accepted signature algorithms (defaults to RS256, ES256, PS256)
    pub valid_algorithms: Vec<Algorithm>,
    /// Accepted token types; the first entry is the one enforced
    pub valid_types: Vec<String>,
    /// Local verification keys; when present no network call is made
    pub issuer_signing_keys: Vec<SigningKey>,
    /// Remote JWKS URI, used when no local keys are given
    pub issuer_signing_jwks_uri: Option<String>,
    /// Base URL for discovery; defaults to the first valid issuer
    pub authority: Option<String>,
    /// Required `sub` value
    pub subject: Option<String>,
    /// Expected `nonce`
    pub nonce: Option<String>,
    /// Authorization code bound by `c_hash`
    pub code: Option<String>,
    /// Access token bound by `at_hash`
    pub access_token_for_at_hash: Option<String>,
    /// Tolerance on `exp` / `nbf`
    pub clock_skew: Duration,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            valid_issuers: Vec::new(),
            valid_audiences: Vec::new(),
            valid_algorithms: DEFAULT_ALGORITHMS.to_vec(),
            valid_types: vec![DEFAULT_TOKEN_TYPE.to_string()],
            issuer_signing_keys: Vec::new(),
            issuer_signing_jwks_uri: None,
            authority: None,
            subject: None,
            nonce: None,
            code: None,
            access_token_for_at_hash: None,
            clock_skew: Duration::from_secs(60),
        }
    }
}

impl ValidationConfig {
    /// Policy accepting `issuers` and `audiences` with default everything else
    pub fn new<I, A>(issuers: I, audiences: A) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            valid_issuers: issuers.into_iter().map(Into::into).collect(),
            valid_audiences: audiences.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Verify with local keys
    pub fn with_signing_keys(mut self, keys: Vec<SigningKey>) -> Self {
        self.issuer_signing_keys = keys;
        self
    }

    /// Verify with a remote JWKS
    pub fn with_jwks_uri(mut self, jwks_uri: impl Into<String>) -> Self {
        self.issuer_signing_jwks_uri = Some(jwks_uri.into());
        self
    }

    /// Discover keys from this authority instead of the first issuer
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    /// Require this subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Expect this nonce
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Check `c_hash` against this code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Check `at_hash` against this access token
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token_for_at_hash = Some(access_token.into());
        self
    }

    /// Accept these token types (first one enforced)
    pub fn with_types<T>(mut self, types: T) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
    {
        self.valid_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Accept these algorithms
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.valid_algorithms = algorithms;
        self
    }
}

/// Immutable parameters of one validation call
#[derive(Debug, Clone)]
pub struct ValidationParameters {
    valid_issuers: Vec<String>,
    valid_audiences: Vec<String>,
    valid_algorithms: Vec<Algorithm>,
    valid_types: Vec<String>,
    issuer_signing_keys: Vec<SigningKey>,
    issuer_signing_jwks_uri: Option<String>,
    authority: Option<String>,
    subject: Option<String>,
    nonce: Option<String>,
    code: Option<String>,
    access_token_for_at_hash: Option<String>,
    clock_skew: Duration,
}

fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl ValidationParameters {
    /// Derive parameters from a caller policy
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyIssuers`] or
    /// [`ConfigurationError::EmptyAudiences`] when either list has no
    /// non-empty entry.
    pub fn from_config(config: &ValidationConfig) -> Result<Self, ConfigurationError> {
        let valid_issuers = non_empty(&config.valid_issuers);
        if valid_issuers.is_empty() {
            return Err(ConfigurationError::EmptyIssuers);
        }
        let valid_audiences = non_empty(&config.valid_audiences);
        if valid_audiences.is_empty() {
            return Err(ConfigurationError::EmptyAudiences);
        }

        let mut valid_algorithms = Vec::with_capacity(config.valid_algorithms.len());
        for alg in &config.valid_algorithms {
            if !valid_algorithms.contains(alg) {
                valid_algorithms.push(*alg);
            }
        }
        if valid_algorithms.is_empty() {
            valid_algorithms = DEFAULT_ALGORITHMS.to_vec();
        }

        let mut valid_types = non_empty(&config.valid_types);
        if valid_types.is_empty() {
            valid_types.push(DEFAULT_TOKEN_TYPE.to_string());
        }

        let filled = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());

        Ok(Self {
            valid_issuers,
            valid_audiences,
            valid_algorithms,
            valid_types,
            issuer_signing_keys: config.issuer_signing_keys.clone(),
            issuer_signing_jwks_uri: filled(&config.issuer_signing_jwks_uri),
            authority: filled(&config.authority),
            subject: filled(&config.subject),
            nonce: filled(&config.nonce),
            code: filled(&config.code),
            access_token_for_at_hash: filled(&config.access_token_for_at_hash),
            clock_skew: config.clock_skew,
        })
    }

    /// Accepted issuers
    pub fn valid_issuers(&self) -> &[String] {
        &self.valid_issuers
    }

    /// Accepted audiences
    pub fn valid_audiences(&self) -> &[String] {
        &self.valid_audiences
    }

    /// Accepted algorithms, deduplicated, in caller order
    pub fn valid_algorithms(&self) -> &[Algorithm] {
        &self.valid_algorithms
    }

    /// Accepted token types
    pub fn valid_types(&self) -> &[String] {
        &self.valid_types
    }

    /// The enforced token type
    pub fn expected_type(&self) -> &str {
        // from_config guarantees one entry
        self.valid_types.first().map_or(DEFAULT_TOKEN_TYPE, String::as_str)
    }

    /// Local keys
    pub fn issuer_signing_keys(&self) -> &[SigningKey] {
        &self.issuer_signing_keys
    }

    /// Remote JWKS URI
    pub fn issuer_signing_jwks_uri(&self) -> Option<&str> {
        self.issuer_signing_jwks_uri.as_deref()
    }

    /// Discovery document URL: `{authority or first issuer}/.well-known/openid-configuration`
    pub fn discovery_url(&self) -> String {
        let base = self
            .authority
            .as_deref()
            .or_else(|| self.valid_issuers.first().map(String::as_str))
            .unwrap_or_default();
        format!(
            "{}/.well-known/openid-configuration",
            base.trim_end_matches('/')
        )
    }

    /// Required subject
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Expected nonce
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    /// Authorization code for `c_hash`
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Access token for `at_hash`
    pub fn access_token_for_at_hash(&self) -> Option<&str> {
        self.access_token_for_at_hash.as_deref()
    }

    /// Clock skew tolerance
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }
}
