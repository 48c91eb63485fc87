//! JWT validation
//!
//! This module verifies compact JWS tokens issued by an OpenID provider:
//!
//! - `hash` - OIDC left-half SHA-256 hashes for `c_hash` / `at_hash`
//! - `jwks` - JWKS fetching with a TTL cache
//! - `params` - caller policy and derived per-call parameters
//! - `keys` - key source resolution (local keys, JWKS URI, discovery)
//! - `claims` - nonce, `c_hash` and `at_hash` rules
//! - `validator` - the full validation pipeline
//!
//! ## Key sources
//!
//! Keys come from the first source that applies, in this order:
//!
//! 1. keys supplied in [`ValidationConfig::issuer_signing_keys`]
//! 2. the JWKS at [`ValidationConfig::issuer_signing_jwks_uri`]
//! 3. the `jwks_uri` of the authority's discovery document
//!
//! A failure in the chosen source is returned as is; later sources are not
//! tried.

pub mod claims;
pub mod hash;
pub mod jwks;
pub mod keys;
pub mod params;
pub mod validator;

pub use claims::ClaimsValidator;
pub use hash::HashChecker;
pub use jwks::{DEFAULT_JWKS_TTL, JwksCache, JwksClient};
pub use keys::{
    DiscoveryStrategy, KeySet, KeySetStrategy, KeySource, KeySourceResolver, LocalKeysStrategy,
    RemoteJwksStrategy,
};
pub use params::{
    DEFAULT_ALGORITHMS, DEFAULT_TOKEN_TYPE, SigningKey, ValidationConfig, ValidationParameters,
};
pub use validator::{TokenValidationResult, TokenValidator};

pub use jsonwebtoken::Algorithm;
