//! # oidflow-auth - OAuth 2.0 / OpenID Connect client
//!
//! Token acquisition for public and confidential clients, plus standalone
//! validation of JWTs issued by an OpenID provider.
//!
//! ## Architecture
//!
//! - [`application`] - [`ClientApplication`], the orchestrator behind every
//!   `acquire_token_*` call
//! - [`grant`] - one client per OAuth grant (device code, username/password,
//!   authorization code, silent, refresh token, client credentials)
//! - [`jwt`] - token validation: key source resolution, signature and claim
//!   checks, OIDC hash claims
//! - [`authority`] - authority parsing and OpenID discovery
//! - [`cache`] - token cache trait and the in-memory default
//! - [`telemetry`] - server telemetry headers and optional metrics
//! - [`network`] - the HTTP seam and its reqwest implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oidflow_auth::{ClientApplication, Configuration, RequestOptions, ClientCredentialRequest};
//!
//! # async fn run() -> oidflow_auth::Result<()> {
//! let app = ClientApplication::new(
//!     Configuration::new("my-client-id", "https://login.example.com/contoso/")
//!         .with_client_secret("s3cret"),
//! )?;
//!
//! let result = app
//!     .acquire_token_by_client_credential(ClientCredentialRequest {
//!         options: RequestOptions::with_scopes(["api://backend/.default"]),
//!     })
//!     .await?;
//! if let Some(result) = result {
//!     println!("token expires at {}", result.expires_on);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Token validation
//!
//! ```rust,no_run
//! use oidflow_auth::{ClientApplication, Configuration, ValidationConfig};
//!
//! # async fn run(app: ClientApplication, token: &str) -> oidflow_auth::Result<()> {
//! let config = ValidationConfig::new(["https://issuer.example.com/"], ["api://my-api"]);
//! let validated = app.validate_token(token, &config).await?;
//! println!("subject: {:?}", validated.payload.get("sub"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics` - acquisition, cache and validation metrics via the `metrics` facade
//!
//! ## Standards Compliance
//!
//! - **RFC 6749** - OAuth 2.0 Authorization Framework
//! - **RFC 7636** - Proof Key for Code Exchange (PKCE)
//! - **RFC 7519** - JSON Web Token (JWT)
//! - **RFC 7517** - JSON Web Key (JWK)
//! - **RFC 8628** - OAuth 2.0 Device Authorization Grant
//! - **OpenID Connect Core 1.0** and **Discovery 1.0**

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod account;
pub mod application;
pub mod authority;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod grant;
pub mod jwt;
pub mod network;
pub mod request;
pub mod telemetry;

#[cfg(test)]
mod test_support;

#[doc(inline)]
pub use account::{AccountInfo, ClientInfo, IdTokenClaims};
#[doc(inline)]
pub use application::{ClientApplication, ClientApplicationBuilder, ClientApplicationConfig};
#[doc(inline)]
pub use authority::{Authority, AuthorityMetadata, OpenIdConfiguration};
#[doc(inline)]
pub use cache::{CacheError, InMemoryTokenCache, TokenCache};
#[doc(inline)]
pub use config::{AuthOptions, Configuration, LoggerOptions, ProtocolMode, SystemOptions};
#[doc(inline)]
pub use crypto::{CryptoProvider, DefaultCryptoProvider, PkceCodes};
#[doc(inline)]
pub use error::{
    AcquisitionError, AcquisitionErrorKind, AuthError, ClaimsError, ConfigurationError,
    ResolutionError, Result, VerificationCheck, VerificationError,
};
#[doc(inline)]
pub use grant::{AuthenticationResult, AuthorizationUrl};
#[doc(inline)]
pub use jwt::{
    Algorithm, HashChecker, SigningKey, TokenValidationResult, TokenValidator, ValidationConfig,
};
#[doc(inline)]
pub use network::{NetworkError, NetworkModule, ReqwestNetworkModule};
#[doc(inline)]
pub use request::{
    AuthorizationCodeRequest, AuthorizationUrlRequest, ClientCredentialRequest, DeviceCodeInfo,
    DeviceCodeRequest, GrantRequest, RefreshTokenRequest, RequestOptions, ScopeSet,
    SilentFlowRequest, UsernamePasswordRequest,
};
#[doc(inline)]
pub use telemetry::{ApiId, TelemetryStore};
