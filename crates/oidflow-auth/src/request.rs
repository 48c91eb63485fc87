//! Request types
//!
//! Callers build a grant-specific request ([`DeviceCodeRequest`],
//! [`SilentFlowRequest`], ...) whose shared fields live in [`RequestOptions`].
//! Before dispatch the orchestrator turns those options into a
//! [`BaseAuthRequest`]: correlation id assigned, authority defaulted, scopes
//! normalised and claims merged with the client capabilities.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::account::AccountInfo;
use crate::crypto::CryptoProvider;
use crate::error::ConfigurationError;
use crate::telemetry::ApiId;

/// Scopes requested by default on user flows
pub const OIDC_DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// Ordered, case-insensitively deduplicated scope set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    /// Build a set from scope strings; blanks are dropped, first spelling wins
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for scope in scopes {
            set.insert(scope.as_ref());
        }
        set
    }

    /// Parse a space-delimited scope string
    pub fn from_space_delimited(scopes: &str) -> Self {
        Self::new(scopes.split_whitespace())
    }

    /// Add a scope if not already present
    pub fn insert(&mut self, scope: &str) {
        let scope = scope.trim();
        if !scope.is_empty() && !self.contains(scope) {
            self.0.push(scope.to_string());
        }
    }

    /// Case-insensitive membership
    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s.eq_ignore_ascii_case(scope))
    }

    /// Whether every scope in `other` is present
    pub fn contains_all(&self, other: &ScopeSet) -> bool {
        other.iter().all(|s| self.contains(s))
    }

    /// Copy with the OIDC default scopes removed
    pub fn without_oidc_scopes(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|s| !OIDC_DEFAULT_SCOPES.iter().any(|d| s.eq_ignore_ascii_case(d)))
                .cloned()
                .collect(),
        )
    }

    /// Iterate scopes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of scopes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Fields shared by every grant request, as supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Authority override for this request
    pub authority: Option<String>,
    /// Correlation id; generated when absent
    pub correlation_id: Option<String>,
    /// Claims request JSON (e.g. a claims challenge)
    pub claims: Option<String>,
    /// Extra token request parameters
    pub extra_parameters: Vec<(String, String)>,
}

impl RequestOptions {
    /// Options requesting `scopes`
    pub fn with_scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// Fully populated request common to all grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseAuthRequest {
    scopes: ScopeSet,
    authority: String,
    correlation_id: String,
    claims: Option<String>,
    extra_parameters: Vec<(String, String)>,
}

impl BaseAuthRequest {
    /// Start building a request that defaults to `default_authority`
    pub fn builder(default_authority: impl Into<String>) -> BaseAuthRequestBuilder {
        BaseAuthRequestBuilder {
            default_authority: default_authority.into(),
            authority: None,
            scopes: Vec::new(),
            correlation_id: None,
            claims: None,
            client_capabilities: Vec::new(),
            extra_parameters: Vec::new(),
            include_oidc_scopes: true,
        }
    }

    /// Normalised scopes
    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    /// Authority for this request
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Correlation id
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Claims parameter, merged with client capabilities
    pub fn claims(&self) -> Option<&str> {
        self.claims.as_deref()
    }

    /// Extra token request parameters
    pub fn extra_parameters(&self) -> &[(String, String)] {
        &self.extra_parameters
    }
}

/// Builder for [`BaseAuthRequest`]
#[derive(Debug, Clone)]
pub struct BaseAuthRequestBuilder {
    default_authority: String,
    authority: Option<String>,
    scopes: Vec<String>,
    correlation_id: Option<String>,
    claims: Option<String>,
    client_capabilities: Vec<String>,
    extra_parameters: Vec<(String, String)>,
    include_oidc_scopes: bool,
}

impl BaseAuthRequestBuilder {
    /// Take every caller-supplied field from `options`
    pub fn options(mut self, options: &RequestOptions) -> Self {
        self.scopes.extend(options.scopes.iter().cloned());
        self.authority = options.authority.clone().or(self.authority);
        self.correlation_id = options.correlation_id.clone().or(self.correlation_id);
        self.claims = options.claims.clone().or(self.claims);
        self.extra_parameters
            .extend(options.extra_parameters.iter().cloned());
        self
    }

    /// Add scopes
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Override the authority
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    /// Use an existing correlation id
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the claims request
    pub fn claims(mut self, claims: impl Into<String>) -> Self {
        self.claims = Some(claims.into());
        self
    }

    /// Capabilities merged into the claims request as `xms_cc`
    pub fn client_capabilities(mut self, capabilities: &[String]) -> Self {
        self.client_capabilities = capabilities.to_vec();
        self
    }

    /// Whether `openid profile offline_access` are added (user flows only)
    pub fn include_oidc_scopes(mut self, include: bool) -> Self {
        self.include_oidc_scopes = include;
        self
    }

    /// Produce the request
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRequest`] when a non-user flow has
    /// no scopes or the claims request is not a JSON object.
    pub fn build(self, crypto: &dyn CryptoProvider) -> Result<BaseAuthRequest, ConfigurationError> {
        let mut scopes = ScopeSet::new(&self.scopes);
        if self.include_oidc_scopes {
            for scope in OIDC_DEFAULT_SCOPES {
                scopes.insert(scope);
            }
        } else if scopes.is_empty() {
            return Err(ConfigurationError::InvalidRequest(
                "at least one scope is required".to_string(),
            ));
        }

        let correlation_id = self
            .correlation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| crypto.create_new_guid());

        let authority = self
            .authority
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(self.default_authority);

        Ok(BaseAuthRequest {
            scopes,
            authority,
            correlation_id,
            claims: merge_claims(self.claims.as_deref(), &self.client_capabilities)?,
            extra_parameters: self.extra_parameters,
        })
    }
}

/// Merge a claims request with client capabilities
///
/// Capabilities become `{"access_token": {"xms_cc": {"values": [...]}}}`.
///
/// # Errors
///
/// Returns [`ConfigurationError::InvalidRequest`] if `claims` is not a JSON
/// object.
pub fn merge_claims(
    claims: Option<&str>,
    capabilities: &[String],
) -> Result<Option<String>, ConfigurationError> {
    let claims = claims.filter(|c| !c.trim().is_empty());
    if capabilities.is_empty() {
        return Ok(claims.map(str::to_string));
    }

    let mut merged = match claims {
        Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => {
                return Err(ConfigurationError::InvalidRequest(
                    "claims must be a JSON object".to_string(),
                ));
            }
        },
        None => serde_json::Map::new(),
    };

    let access_token = merged
        .entry("access_token")
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if let serde_json::Value::Object(access_token) = access_token {
        access_token.insert(
            "xms_cc".to_string(),
            serde_json::json!({ "values": capabilities }),
        );
    }

    Ok(Some(serde_json::Value::Object(merged).to_string()))
}

/// Device code details shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeInfo {
    /// Code the user enters
    pub user_code: String,
    /// Page where the code is entered
    pub verification_uri: String,
    /// Lifetime of the device code
    pub expires_in: Duration,
    /// Minimum polling interval
    pub interval: Duration,
    /// Ready-made instruction text
    pub message: String,
}

/// Callback receiving the device code details
pub type DeviceCodeCallback = Arc<dyn Fn(&DeviceCodeInfo) + Send + Sync>;

/// Device authorization grant (RFC 8628)
#[derive(Clone)]
pub struct DeviceCodeRequest {
    /// Shared options
    pub options: RequestOptions,
    /// Receives the code to display
    pub device_code_callback: DeviceCodeCallback,
    /// Stops polling when cancelled; the acquisition then yields `None`
    pub cancellation: Option<CancellationToken>,
    /// Upper bound on polling, shorter than the code lifetime
    pub timeout: Option<Duration>,
}

impl DeviceCodeRequest {
    /// Request with a callback and no cancellation
    pub fn new(options: RequestOptions, callback: DeviceCodeCallback) -> Self {
        Self {
            options,
            device_code_callback: callback,
            cancellation: None,
            timeout: None,
        }
    }
}

impl fmt::Debug for DeviceCodeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCodeRequest")
            .field("options", &self.options)
            .field("device_code_callback", &"<callback>")
            .field("cancellation", &self.cancellation)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Resource owner password credentials grant
#[derive(Debug, Clone)]
pub struct UsernamePasswordRequest {
    /// Shared options
    pub options: RequestOptions,
    /// Username
    pub username: String,
    /// Password
    pub password: SecretString,
}

/// Authorization code redemption
#[derive(Debug, Clone)]
pub struct AuthorizationCodeRequest {
    /// Shared options
    pub options: RequestOptions,
    /// Code returned to the redirect URI
    pub code: String,
    /// Redirect URI used on the authorization request
    pub redirect_uri: Option<String>,
    /// PKCE verifier matching the challenge that was sent
    pub code_verifier: Option<SecretString>,
    /// Nonce sent on the authorization request, checked against the id token
    pub nonce: Option<String>,
}

/// Authorization URL parameters
#[derive(Debug, Clone, Default)]
pub struct AuthorizationUrlRequest {
    /// Shared options
    pub options: RequestOptions,
    /// Redirect URI; falls back to the configured one
    pub redirect_uri: Option<String>,
    /// Opaque state; generated when absent
    pub state: Option<String>,
    /// Nonce; generated when absent
    pub nonce: Option<String>,
    /// `prompt` parameter
    pub prompt: Option<String>,
    /// `login_hint` parameter
    pub login_hint: Option<String>,
    /// `response_mode` parameter
    pub response_mode: Option<String>,
    /// Caller-computed S256 challenge; PKCE codes are generated when absent
    pub code_challenge: Option<String>,
    /// Extra query parameters
    pub extra_query_parameters: Vec<(String, String)>,
}

/// Silent acquisition for a known account
#[derive(Debug, Clone)]
pub struct SilentFlowRequest {
    /// Shared options (`claims` here bypasses the cache)
    pub options: RequestOptions,
    /// Account to acquire for
    pub account: AccountInfo,
    /// Skip cached access tokens and use the refresh token
    pub force_refresh: bool,
}

/// Redemption of a caller-held refresh token
#[derive(Debug, Clone)]
pub struct RefreshTokenRequest {
    /// Shared options
    pub options: RequestOptions,
    /// Refresh token
    pub refresh_token: SecretString,
}

/// Client credentials grant
#[derive(Debug, Clone, Default)]
pub struct ClientCredentialRequest {
    /// Shared options
    pub options: RequestOptions,
}

/// Closed set of grant requests accepted by the orchestrator
#[derive(Debug, Clone)]
pub enum GrantRequest {
    /// Device code
    DeviceCode(DeviceCodeRequest),
    /// Username / password
    UsernamePassword(UsernamePasswordRequest),
    /// Authorization code
    AuthorizationCode(AuthorizationCodeRequest),
    /// Silent
    Silent(SilentFlowRequest),
    /// Refresh token
    RefreshToken(RefreshTokenRequest),
    /// Client credentials
    ClientCredential(ClientCredentialRequest),
}

impl GrantRequest {
    /// API id reported for this request
    pub fn api_id(&self) -> ApiId {
        match self {
            Self::DeviceCode(_) => ApiId::AcquireTokenByDeviceCode,
            Self::UsernamePassword(_) => ApiId::AcquireTokenByUsernamePassword,
            Self::AuthorizationCode(_) => ApiId::AcquireTokenByCode,
            Self::Silent(_) => ApiId::AcquireTokenSilent,
            Self::RefreshToken(_) => ApiId::AcquireTokenByRefreshToken,
            Self::ClientCredential(_) => ApiId::AcquireTokenByClientCredential,
        }
    }

    /// Caller-supplied shared options
    pub fn options(&self) -> &RequestOptions {
        match self {
            Self::DeviceCode(r) => &r.options,
            Self::UsernamePassword(r) => &r.options,
            Self::AuthorizationCode(r) => &r.options,
            Self::Silent(r) => &r.options,
            Self::RefreshToken(r) => &r.options,
            Self::ClientCredential(r) => &r.options,
        }
    }

    /// Whether the caller asked to bypass cached tokens
    pub fn force_refresh(&self) -> bool {
        matches!(self, Self::Silent(r) if r.force_refresh)
    }

    /// Whether the request acts on behalf of a user
    pub(crate) fn is_user_flow(&self) -> bool {
        !matches!(self, Self::ClientCredential(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;

    #[test]
    fn test_scope_set_dedup_and_order() {
        let scopes = ScopeSet::new(["User.Read", " ", "user.read", "Mail.Send"]);
        assert_eq!(scopes.to_string(), "User.Read Mail.Send");
        assert!(scopes.contains("USER.READ"));
        assert!(scopes.contains_all(&ScopeSet::from_space_delimited("mail.send user.read")));
        assert!(!scopes.contains_all(&ScopeSet::new(["Files.Read"])));
    }

    #[test]
    fn test_without_oidc_scopes() {
        let scopes = ScopeSet::from_space_delimited("openid User.Read Profile offline_access");
        assert_eq!(scopes.without_oidc_scopes().to_string(), "User.Read");
    }

    #[test]
    fn test_builder_fills_defaults() {
        let options = RequestOptions::with_scopes(["User.Read"]);
        let request = BaseAuthRequest::builder("https://login.example.com/common/")
            .options(&options)
            .build(&DefaultCryptoProvider)
            .unwrap();

        assert_eq!(request.authority(), "https://login.example.com/common/");
        assert_eq!(request.correlation_id().len(), 36);
        assert_eq!(
            request.scopes().to_string(),
            "User.Read openid profile offline_access"
        );
        assert!(request.claims().is_none());
    }

    #[test]
    fn test_builder_keeps_caller_fields() {
        let options = RequestOptions {
            scopes: vec!["api://x/.default".into()],
            authority: Some("https://login.example.com/tenant/".into()),
            correlation_id: Some("corr-1".into()),
            ..Default::default()
        };
        let request = BaseAuthRequest::builder("https://login.example.com/common/")
            .options(&options)
            .include_oidc_scopes(false)
            .build(&DefaultCryptoProvider)
            .unwrap();

        assert_eq!(request.authority(), "https://login.example.com/tenant/");
        assert_eq!(request.correlation_id(), "corr-1");
        assert_eq!(request.scopes().to_string(), "api://x/.default");
    }

    #[test]
    fn test_non_user_flow_requires_scopes() {
        let err = BaseAuthRequest::builder("https://login.example.com/common/")
            .include_oidc_scopes(false)
            .build(&DefaultCryptoProvider)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidRequest(_)));
    }

    #[test]
    fn test_merge_claims_with_capabilities() {
        assert_eq!(merge_claims(None, &[]).unwrap(), None);
        assert_eq!(
            merge_claims(Some("{\"id_token\":{}}"), &[]).unwrap().as_deref(),
            Some("{\"id_token\":{}}")
        );

        let merged = merge_claims(
            Some(r#"{"access_token":{"nbf":{"essential":true}}}"#),
            &["cp1".to_string()],
        )
        .unwrap()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["access_token"]["nbf"]["essential"], true);
        assert_eq!(value["access_token"]["xms_cc"]["values"][0], "cp1");

        assert!(merge_claims(Some("[1]"), &["cp1".to_string()]).is_err());
    }

    #[test]
    fn test_grant_request_api_ids() {
        let silent = GrantRequest::Silent(SilentFlowRequest {
            options: RequestOptions::default(),
            account: AccountInfo {
                home_account_id: "u.t".into(),
                environment: "login.example.com".into(),
                tenant_id: "t".into(),
                username: String::new(),
                local_account_id: "u".into(),
                name: None,
                id_token_claims: None,
            },
            force_refresh: true,
        });
        assert_eq!(silent.api_id(), ApiId::AcquireTokenSilent);
        assert!(silent.force_refresh());
        assert!(silent.is_user_flow());

        let cc = GrantRequest::ClientCredential(ClientCredentialRequest::default());
        assert_eq!(cc.api_id().code(), 771);
        assert!(!cc.is_user_flow());
    }
}
