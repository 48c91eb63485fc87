//! # Key source resolution
//!
//! Signing keys come from one of three sources, tried in order:
//!
//! 1. [`LocalKeysStrategy`]: `issuer_signing_keys` supplied by the caller
//! 2. [`RemoteJwksStrategy`]: `issuer_signing_jwks_uri`
//! 3. [`DiscoveryStrategy`]: the issuer's OpenID configuration, then its `jwks_uri`
//!
//! The first strategy that applies is the only one used. A failure inside it
//! is returned as is; the resolver never falls through to the next strategy.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey, Header};
use tracing::{debug, warn};

use super::jwks::JwksCache;
use super::params::{SigningKey, ValidationParameters};
use crate::authority::fetch_openid_configuration;
use crate::error::{AuthError, ResolutionError, VerificationCheck};

/// Where a key set came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Caller-supplied keys
    Local,
    /// Configured JWKS URI
    RemoteJwks(String),
    /// JWKS URI found through discovery
    Discovery {
        /// Discovery document URL
        discovery_url: String,
        /// `jwks_uri` it advertised
        jwks_uri: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    Ec,
    Oct,
    Okp,
}

impl KeyFamily {
    fn for_algorithm(alg: Algorithm) -> Self {
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Self::Oct,
            Algorithm::ES256 | Algorithm::ES384 => Self::Ec,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Self::Rsa,
            _ => Self::Okp,
        }
    }

    fn for_jwk(jwk: &Jwk) -> Self {
        match jwk.algorithm {
            AlgorithmParameters::RSA(_) => Self::Rsa,
            AlgorithmParameters::EllipticCurve(_) => Self::Ec,
            AlgorithmParameters::OctetKey(_) => Self::Oct,
            _ => Self::Okp,
        }
    }
}

/// A usable verification key
#[derive(Clone)]
struct VerificationKey {
    kid: Option<String>,
    family: KeyFamily,
    /// `alg` pinned by the JWK, if any (`Debug` name, e.g. `RS256`)
    alg: Option<String>,
    key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let key = DecodingKey::from_jwk(jwk).map_err(|e| e.to_string())?;
        Ok(Self {
            kid: jwk.common.key_id.clone(),
            family: KeyFamily::for_jwk(jwk),
            alg: jwk.common.key_algorithm.as_ref().map(|a| format!("{a:?}")),
            key,
        })
    }

    fn from_signing_key(key: &SigningKey) -> Result<Self, String> {
        match key {
            SigningKey::Jwk(jwk) => Self::from_jwk(jwk),
            SigningKey::RsaPem { kid, pem } => Ok(Self {
                kid: kid.clone(),
                family: KeyFamily::Rsa,
                alg: None,
                key: DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| e.to_string())?,
            }),
            SigningKey::EcPem { kid, pem } => Ok(Self {
                kid: kid.clone(),
                family: KeyFamily::Ec,
                alg: None,
                key: DecodingKey::from_ec_pem(pem.as_bytes()).map_err(|e| e.to_string())?,
            }),
        }
    }

    fn accepts(&self, header: &Header) -> bool {
        let kid_matches = match (&header.kid, &self.kid) {
            (Some(wanted), Some(kid)) => wanted == kid,
            (Some(_), None) => false,
            (None, _) => true,
        };
        let alg_matches = self
            .alg
            .as_deref()
            .is_none_or(|alg| alg == format!("{:?}", header.alg));

        kid_matches && alg_matches && self.family == KeyFamily::for_algorithm(header.alg)
    }
}

/// Verification keys resolved for one validation call
#[derive(Debug, Clone)]
pub struct KeySet {
    source: KeySource,
    keys: Vec<VerificationKey>,
}

impl KeySet {
    fn from_jwk_set(source: KeySource, jwks: &JwkSet) -> Self {
        let keys = jwks
            .keys
            .iter()
            .filter(|jwk| {
                matches!(
                    jwk.common.public_key_use,
                    None | Some(PublicKeyUse::Signature)
                )
            })
            .filter_map(|jwk| match VerificationKey::from_jwk(jwk) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                    None
                }
            })
            .collect();
        Self { source, keys }
    }

    /// Where the keys came from
    pub fn source(&self) -> &KeySource {
        &self.source
    }

    /// Number of usable keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no usable key
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Pick the key for `header`
    ///
    /// Candidates must match the header's `kid` (when present), the key type
    /// of its `alg`, and any `alg` pinned on the key. Exactly one candidate
    /// must remain.
    ///
    /// # Errors
    ///
    /// Returns a [`VerificationCheck::KeySelection`] error when no key or more
    /// than one key qualifies.
    pub fn select(&self, header: &Header) -> Result<&DecodingKey, AuthError> {
        let mut candidates = self.keys.iter().filter(|k| k.accepts(header));
        match (candidates.next(), candidates.next()) {
            (Some(key), None) => Ok(&key.key),
            (None, _) => Err(AuthError::verification(
                VerificationCheck::KeySelection,
                format!(
                    "no key matches kid {:?} and algorithm {:?}",
                    header.kid, header.alg
                ),
            )),
            (Some(_), Some(_)) => Err(AuthError::verification(
                VerificationCheck::KeySelection,
                format!(
                    "several keys match kid {:?} and algorithm {:?}",
                    header.kid, header.alg
                ),
            )),
        }
    }
}

/// One way of obtaining a key set
#[async_trait]
pub trait KeySetStrategy: Send + Sync + fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Whether this strategy is selected for `params`
    fn applies(&self, params: &ValidationParameters) -> bool;

    /// Produce the key set; `kid` lets caching strategies detect rotation
    async fn resolve(
        &self,
        params: &ValidationParameters,
        kid: Option<&str>,
    ) -> Result<KeySet, ResolutionError>;
}

/// Keys supplied directly in the validation config
#[derive(Debug, Default)]
pub struct LocalKeysStrategy;

#[async_trait]
impl KeySetStrategy for LocalKeysStrategy {
    fn name(&self) -> &'static str {
        "local"
    }

    fn applies(&self, params: &ValidationParameters) -> bool {
        !params.issuer_signing_keys().is_empty()
    }

    async fn resolve(
        &self,
        params: &ValidationParameters,
        _kid: Option<&str>,
    ) -> Result<KeySet, ResolutionError> {
        let keys = params
            .issuer_signing_keys()
            .iter()
            .map(VerificationKey::from_signing_key)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ResolutionError::InvalidKeyMaterial)?;

        Ok(KeySet {
            source: KeySource::Local,
            keys,
        })
    }
}

/// JWKS fetched from the configured URI
#[derive(Debug)]
pub struct RemoteJwksStrategy {
    jwks: Arc<JwksCache>,
}

impl RemoteJwksStrategy {
    /// Strategy backed by a shared JWKS cache
    pub fn new(jwks: Arc<JwksCache>) -> Self {
        Self { jwks }
    }
}

#[async_trait]
impl KeySetStrategy for RemoteJwksStrategy {
    fn name(&self) -> &'static str {
        "remote_jwks"
    }

    fn applies(&self, params: &ValidationParameters) -> bool {
        params.issuer_signing_jwks_uri().is_some()
    }

    async fn resolve(
        &self,
        params: &ValidationParameters,
        kid: Option<&str>,
    ) -> Result<KeySet, ResolutionError> {
        let uri = params
            .issuer_signing_jwks_uri()
            .ok_or(ResolutionError::NoKeySource)?;
        let jwks = self.jwks.client(uri).await.get_jwks_for_kid(kid).await?;
        Ok(KeySet::from_jwk_set(KeySource::RemoteJwks(uri.to_string()), &jwks))
    }
}

/// JWKS located through the issuer's discovery document
#[derive(Debug)]
pub struct DiscoveryStrategy {
    jwks: Arc<JwksCache>,
    /// discovery URL -> (jwks_uri, fetched at)
    discovered: DashMap<String, (String, Instant)>,
    ttl: Duration,
}

impl DiscoveryStrategy {
    /// Strategy backed by a shared JWKS cache; discovered URIs live for `ttl`
    pub fn new(jwks: Arc<JwksCache>, ttl: Duration) -> Self {
        Self {
            jwks,
            discovered: DashMap::new(),
            ttl,
        }
    }

    async fn jwks_uri(&self, discovery_url: &str) -> Result<String, ResolutionError> {
        if let Some(entry) = self.discovered.get(discovery_url)
            && entry.1.elapsed() < self.ttl
        {
            return Ok(entry.0.clone());
        }

        let configuration =
            fetch_openid_configuration(self.jwks.network().as_ref(), discovery_url).await?;
        let jwks_uri = configuration
            .jwks_uri
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| ResolutionError::MalformedDiscovery {
                url: discovery_url.to_string(),
                reason: "document has no jwks_uri".to_string(),
            })?;

        self.discovered.insert(
            discovery_url.to_string(),
            (jwks_uri.clone(), Instant::now()),
        );
        Ok(jwks_uri)
    }
}

#[async_trait]
impl KeySetStrategy for DiscoveryStrategy {
    fn name(&self) -> &'static str {
        "discovery"
    }

    fn applies(&self, _params: &ValidationParameters) -> bool {
        true
    }

    async fn resolve(
        &self,
        params: &ValidationParameters,
        kid: Option<&str>,
    ) -> Result<KeySet, ResolutionError> {
        let discovery_url = params.discovery_url();
        let jwks_uri = self.jwks_uri(&discovery_url).await?;
        debug!(discovery_url = %discovery_url, jwks_uri = %jwks_uri, "Discovered JWKS URI");

        let jwks = self.jwks.client(&jwks_uri).await.get_jwks_for_kid(kid).await?;
        Ok(KeySet::from_jwk_set(
            KeySource::Discovery {
                discovery_url,
                jwks_uri,
            },
            &jwks,
        ))
    }
}

/// Ordered list of key set strategies; the first applicable one wins
#[derive(Debug)]
pub struct KeySourceResolver {
    strategies: Vec<Box<dyn KeySetStrategy>>,
}

impl KeySourceResolver {
    /// Local keys, then remote JWKS, then discovery
    pub fn new(jwks: Arc<JwksCache>, discovery_ttl: Duration) -> Self {
        Self::with_strategies(vec![
            Box::new(LocalKeysStrategy),
            Box::new(RemoteJwksStrategy::new(Arc::clone(&jwks))),
            Box::new(DiscoveryStrategy::new(jwks, discovery_ttl)),
        ])
    }

    /// Resolver with a custom strategy order
    pub fn with_strategies(strategies: Vec<Box<dyn KeySetStrategy>>) -> Self {
        Self { strategies }
    }

    /// Resolve the key set for `params`
    ///
    /// # Errors
    ///
    /// Returns the selected strategy's [`ResolutionError`], or
    /// [`ResolutionError::NoKeySource`] if none applies.
    pub async fn resolve_key_set(
        &self,
        params: &ValidationParameters,
        kid: Option<&str>,
    ) -> Result<KeySet, ResolutionError> {
        for strategy in &self.strategies {
            if strategy.applies(params) {
                debug!(strategy = strategy.name(), "Key source selected");
                return strategy.resolve(params, kid).await;
            }
        }
        Err(ResolutionError::NoKeySource)
    }
}
