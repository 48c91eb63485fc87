//! Error taxonomy
//!
//! Every fallible operation in the crate returns [`AuthError`], which splits
//! failures by the stage that produced them:
//!
//! - [`ConfigurationError`] - caller input is structurally invalid; raised before
//!   any network or cryptographic work
//! - [`ResolutionError`] - authority metadata, discovery or JWKS retrieval failed
//! - [`VerificationError`] - JWT signature / header / standard claim check failed
//! - [`ClaimsError`] - nonce, `c_hash` or `at_hash` mismatch on an already
//!   cryptographically verified token
//! - [`AcquisitionError`] - a grant flow failed; annotated with the API id and
//!   correlation id of the request

use std::fmt;

use thiserror::Error;

use crate::network::NetworkError;
use crate::telemetry::ApiId;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, AuthError>;

/// Top-level error returned by every public operation
#[derive(Debug, Error)]
pub enum AuthError {
    /// Caller-supplied parameters are invalid
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Key set or authority metadata could not be resolved
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Token failed signature or standard claim verification
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Token failed OIDC hybrid-flow claim checks
    #[error(transparent)]
    Claims(#[from] ClaimsError),

    /// Token acquisition failed
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}

impl AuthError {
    /// Short, stable code used by telemetry and logs
    pub fn error_code(&self) -> &str {
        match self {
            Self::Configuration(e) => e.code(),
            Self::Resolution(e) => e.code(),
            Self::Verification(e) => e.check.code(),
            Self::Claims(e) => e.code(),
            Self::Acquisition(e) => e.kind.code(),
        }
    }

    /// Build a verification error for `check`
    pub(crate) fn verification(check: VerificationCheck, message: impl Into<String>) -> Self {
        Self::Verification(VerificationError {
            check,
            message: message.into(),
        })
    }
}

/// Structurally invalid caller input
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No token was supplied for validation
    #[error("token to validate is missing or empty")]
    MissingToken,

    /// `valid_issuers` contained no non-empty entry
    #[error("validation config must list at least one non-empty issuer")]
    EmptyIssuers,

    /// `valid_audiences` contained no non-empty entry
    #[error("validation config must list at least one non-empty audience")]
    EmptyAudiences,

    /// Token carries a nonce but the caller supplied none to compare against
    #[error("token contains a nonce claim but no expected nonce was configured")]
    MissingNonce,

    /// Authority URL is malformed or not allowed
    #[error("invalid authority '{authority}': {reason}")]
    InvalidAuthority {
        /// The offending authority
        authority: String,
        /// Why it was rejected
        reason: String,
    },

    /// A URL-typed option could not be parsed
    #[error("invalid {field} URL: {reason}")]
    InvalidUrl {
        /// Which option was invalid
        field: &'static str,
        /// Parse failure
        reason: String,
    },

    /// Authority metadata lacks an endpoint the requested grant needs
    #[error("authority metadata has no {0}")]
    MissingEndpoint(&'static str),

    /// Grant requires a client secret that was not configured
    #[error("client secret is required for this grant")]
    MissingClientSecret,

    /// Request failed pre-flight validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ConfigurationError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::EmptyIssuers => "empty_issuer",
            Self::EmptyAudiences => "empty_audience",
            Self::MissingNonce => "missing_nonce",
            Self::InvalidAuthority { .. } => "invalid_authority",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::MissingEndpoint(_) => "missing_endpoint",
            Self::MissingClientSecret => "missing_client_secret",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Key set / discovery resolution failure
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Network module failed before producing a response
    #[error("request to {url} failed: {source}")]
    Network {
        /// Requested URL
        url: String,
        /// Underlying transport failure
        #[source]
        source: NetworkError,
    },

    /// Endpoint returned a non-success status
    #[error("{url} returned status {status}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Discovery document was not usable
    #[error("malformed discovery document from {url}: {reason}")]
    MalformedDiscovery {
        /// Discovery URL
        url: String,
        /// Parse or content failure
        reason: String,
    },

    /// JWKS document was not usable
    #[error("malformed JWKS from {url}: {reason}")]
    MalformedJwks {
        /// JWKS URL
        url: String,
        /// Parse or content failure
        reason: String,
    },

    /// Endpoint is not https (and not loopback)
    #[error("endpoint {0} must use https (http is only allowed for loopback hosts)")]
    InsecureEndpoint(String),

    /// Statically supplied key material could not be used
    #[error("invalid signing key material: {0}")]
    InvalidKeyMaterial(String),

    /// No configured strategy could produce a key set
    #[error("no key source applies to the validation parameters")]
    NoKeySource,
}

impl ResolutionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network_error",
            Self::HttpStatus { .. } => "http_status",
            Self::MalformedDiscovery { .. } => "malformed_discovery",
            Self::MalformedJwks { .. } => "malformed_jwks",
            Self::InsecureEndpoint(_) => "insecure_endpoint",
            Self::InvalidKeyMaterial(_) => "invalid_key_material",
            Self::NoKeySource => "no_key_source",
        }
    }
}

/// Which verification check rejected a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationCheck {
    /// Compact serialization or segment encoding was invalid
    MalformedToken,
    /// No usable key could be selected from the key set
    KeySelection,
    /// Signature did not verify
    Signature,
    /// `alg` header is not in the allow-list
    Algorithm,
    /// `iss` is not one of the valid issuers
    Issuer,
    /// `aud` does not intersect the valid audiences
    Audience,
    /// `sub` does not match the expected subject
    Subject,
    /// `typ` header does not match the expected type
    Type,
    /// Token is expired
    Expiry,
    /// Token is not yet valid
    NotBefore,
    /// A required registered claim is absent
    MissingClaim,
}

impl VerificationCheck {
    fn code(self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed_token",
            Self::KeySelection => "key_selection",
            Self::Signature => "invalid_signature",
            Self::Algorithm => "invalid_algorithm",
            Self::Issuer => "invalid_issuer",
            Self::Audience => "invalid_audience",
            Self::Subject => "invalid_subject",
            Self::Type => "invalid_type",
            Self::Expiry => "token_expired",
            Self::NotBefore => "token_not_yet_valid",
            Self::MissingClaim => "missing_claim",
        }
    }
}

impl fmt::Display for VerificationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// JWT verification failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("token verification failed ({check}): {message}")]
pub struct VerificationError {
    /// The check that failed
    pub check: VerificationCheck,
    /// Human-readable detail
    pub message: String,
}

/// Post-signature OIDC claim mismatch
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    /// `nonce` claim differs from the expected nonce
    #[error("nonce claim does not match the expected nonce")]
    InvalidNonce,

    /// `c_hash` does not bind the token to the supplied authorization code
    #[error("c_hash claim does not match the authorization code")]
    InvalidCHash,

    /// `at_hash` does not bind the token to the supplied access token
    #[error("at_hash claim does not match the access token")]
    InvalidAtHash,
}

impl ClaimsError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidNonce => "invalid_nonce",
            Self::InvalidCHash => "invalid_c_hash",
            Self::InvalidAtHash => "invalid_at_hash",
        }
    }
}

/// Token acquisition failure, annotated for telemetry
#[derive(Debug, Error)]
#[error("{api_id} failed (correlation id {correlation_id}): {kind}")]
pub struct AcquisitionError {
    /// API that was being served
    pub api_id: ApiId,
    /// Correlation id of the failed request
    pub correlation_id: String,
    /// What went wrong
    #[source]
    pub kind: AcquisitionErrorKind,
}

impl AcquisitionError {
    /// Create an acquisition error
    pub fn new(api_id: ApiId, correlation_id: impl Into<String>, kind: AcquisitionErrorKind) -> Self {
        Self {
            api_id,
            correlation_id: correlation_id.into(),
            kind,
        }
    }
}

/// Cause of an [`AcquisitionError`]
#[derive(Debug, Error)]
pub enum AcquisitionErrorKind {
    /// Token endpoint answered with an OAuth error response
    #[error("server returned {error}{}", .description.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    ServerError {
        /// OAuth `error` code (e.g. `invalid_grant`)
        error: String,
        /// OAuth `error_description`
        description: Option<String>,
    },

    /// Transport failure talking to the provider
    #[error("network request failed: {0}")]
    Network(String),

    /// Provider response could not be interpreted
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// Authority metadata could not be resolved
    #[error("authority resolution failed: {0}")]
    AuthorityResolution(#[source] ResolutionError),

    /// Silent flow found nothing usable in the cache
    #[error("no cached tokens found for the account")]
    NoTokensFound,

    /// Token cache failed
    #[error("token cache failure: {0}")]
    Cache(String),

    /// Device code expired before the user completed sign-in
    #[error("device code expired before authorization completed")]
    DeviceCodeExpired,
}

impl AcquisitionErrorKind {
    fn code(&self) -> &str {
        match self {
            Self::ServerError { error, .. } => error,
            Self::Network(_) => "network_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::AuthorityResolution(_) => "authority_resolution_failed",
            Self::NoTokensFound => "no_tokens_found",
            Self::Cache(_) => "cache_error",
            Self::DeviceCodeExpired => "expired_token",
        }
    }
}
