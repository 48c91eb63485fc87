//! Grant clients
//!
//! One client per OAuth 2.0 grant. Each takes a [`ClientApplicationConfig`]
//! built for the request's authority, turns its typed request into oauth2 token
//! requests and hands the token response to [`ResponseHandler`], which
//! normalises it into an [`AuthenticationResult`] and writes the cache.
//!
//! ## Submodules
//!
//! - `authorization_code` - authorization URL construction and code redemption
//! - `client_credentials` - confidential client application tokens
//! - `device_code` - RFC 8628 device authorization grant
//! - `refresh_token` - redemption of a refresh token
//! - `silent` - cache lookup with refresh token fallback
//! - `username_password` - resource owner password credentials

mod authorization_code;
mod client_credentials;
mod device_code;
mod refresh_token;
mod silent;
mod username_password;

pub use authorization_code::{AuthorizationCodeClient, AuthorizationUrl};
pub use client_credentials::ClientCredentialClient;
pub use device_code::DeviceCodeClient;
pub use refresh_token::RefreshTokenClient;
pub use silent::SilentFlowClient;
pub use username_password::UsernamePasswordClient;

use std::fmt;

use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, ErrorResponse,
    ExtraTokenFields, RedirectUrl, RequestTokenError, Scope, StandardRevocableToken,
    StandardTokenResponse, TokenResponse, TokenUrl,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::account::{AccountInfo, ClientInfo, IdTokenClaims};
use crate::application::ClientApplicationConfig;
use crate::cache::{AccessTokenEntity, CacheRecord, IdTokenEntity, RefreshTokenEntity};
use crate::config::ProtocolMode;
use crate::error::{AcquisitionError, AcquisitionErrorKind, AuthError, ConfigurationError};
use crate::jwt::ValidationConfig;
use crate::network::OAuthHttpClient;
use crate::request::{BaseAuthRequest, ScopeSet};
use crate::telemetry::{CURRENT_TELEMETRY_HEADER, LAST_TELEMETRY_HEADER};

const SKU_HEADER: &str = "x-client-SKU";
const VERSION_HEADER: &str = "x-client-VER";
const SKU: &str = "oidflow-auth-rust";
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Provider-specific fields of a token response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OidcTokenFields {
    /// Compact id token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Azure AD style `client_info`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<String>,
}

impl ExtraTokenFields for OidcTokenFields {}

/// Token response carrying [`OidcTokenFields`]
pub type OidcTokenResponse = StandardTokenResponse<OidcTokenFields, BasicTokenType>;

pub(crate) type OidcClient<
    HasAuthUrl = EndpointNotSet,
    HasDeviceAuthUrl = EndpointNotSet,
    HasTokenUrl = EndpointNotSet,
> = oauth2::Client<
    BasicErrorResponse,
    OidcTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    HasAuthUrl,
    HasDeviceAuthUrl,
    EndpointNotSet,
    EndpointNotSet,
    HasTokenUrl,
>;

/// Normalised outcome of a token acquisition
#[derive(Clone)]
pub struct AuthenticationResult {
    /// Access token
    pub access_token: String,
    /// Token type, usually `Bearer`
    pub token_type: String,
    /// Compact id token, if one was issued
    pub id_token: Option<String>,
    /// Decoded id token claims
    pub id_token_claims: Option<IdTokenClaims>,
    /// Account the tokens belong to; `None` for application tokens
    pub account: Option<AccountInfo>,
    /// Scopes the access token was granted for
    pub scopes: ScopeSet,
    /// Access token expiry, seconds since the epoch
    pub expires_on: i64,
    /// Correlation id of the request
    pub correlation_id: String,
    /// Served from the cache without a network call
    pub from_cache: bool,
}

impl fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("account", &self.account.as_ref().map(|a| &a.home_account_id))
            .field("scopes", &self.scopes)
            .field("expires_on", &self.expires_on)
            .field("correlation_id", &self.correlation_id)
            .field("from_cache", &self.from_cache)
            .finish()
    }
}

/// HTTP adapter stamped with the request's client, correlation and telemetry headers
pub(crate) fn http_client(config: &ClientApplicationConfig) -> OAuthHttpClient {
    let telemetry = config.telemetry();
    OAuthHttpClient::new(config.network())
        .with_header(SKU_HEADER, SKU)
        .with_header(VERSION_HEADER, env!("CARGO_PKG_VERSION"))
        .with_header("client-request-id", telemetry.correlation_id())
        .with_header("return-client-request-id", "true")
        .with_header(CURRENT_TELEMETRY_HEADER, &telemetry.current_request_header())
        .with_header(LAST_TELEMETRY_HEADER, &telemetry.last_request_header())
}

/// oauth2 client pointed at the authority's token endpoint
pub(crate) fn token_client(
    config: &ClientApplicationConfig,
) -> Result<OidcClient<EndpointNotSet, EndpointNotSet, EndpointSet>, ConfigurationError> {
    let token_endpoint = config.authority().token_endpoint()?;
    let token_url =
        TokenUrl::new(token_endpoint.to_string()).map_err(|e| ConfigurationError::InvalidUrl {
            field: "token_endpoint",
            reason: e.to_string(),
        })?;

    let auth = &config.configuration().auth;
    let mut client = OidcClient::new(ClientId::new(auth.client_id.clone()))
        .set_token_uri(token_url)
        .set_auth_type(AuthType::RequestBody);
    if let Some(secret) = &auth.client_secret {
        client = client.set_client_secret(ClientSecret::new(secret.expose_secret().clone()));
    }
    Ok(client)
}

/// Parse a redirect URI option
pub(crate) fn redirect_url(redirect_uri: &str) -> Result<RedirectUrl, ConfigurationError> {
    RedirectUrl::new(redirect_uri.to_string()).map_err(|e| ConfigurationError::InvalidUrl {
        field: "redirect_uri",
        reason: e.to_string(),
    })
}

/// Scopes of `request` as oauth2 scopes
pub(crate) fn scopes(request: &BaseAuthRequest) -> Vec<Scope> {
    request
        .scopes()
        .iter()
        .map(|s| Scope::new(s.to_string()))
        .collect()
}

/// Token request parameters beyond the grant's own
pub(crate) fn extra_parameters(
    config: &ClientApplicationConfig,
    request: &BaseAuthRequest,
) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if let Some(claims) = request.claims() {
        params.push(("claims".to_string(), claims.to_string()));
    }
    if config.configuration().auth.protocol_mode == ProtocolMode::Aad {
        params.push(("client_info".to_string(), "1".to_string()));
    }
    params.extend(request.extra_parameters().iter().cloned());
    params
}

/// Map an oauth2 failure to an acquisition error kind
///
/// A server error response still completed a round trip, so the failures
/// reported on this request's telemetry header are cleared.
pub(crate) fn token_error<RE, T>(
    config: &ClientApplicationConfig,
    err: RequestTokenError<RE, T>,
) -> AcquisitionErrorKind
where
    RE: std::error::Error + 'static,
    T: ErrorResponse + Serialize + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            config.telemetry().clear_reported();
            let value = serde_json::to_value(&response).unwrap_or_default();
            let field = |name: &str| value.get(name).and_then(|v| v.as_str()).map(str::to_string);
            AcquisitionErrorKind::ServerError {
                error: field("error").unwrap_or_else(|| "server_error".to_string()),
                description: field("error_description"),
            }
        }
        RequestTokenError::Request(e) => AcquisitionErrorKind::Network(e.to_string()),
        RequestTokenError::Parse(e, _) => AcquisitionErrorKind::MalformedResponse(e.to_string()),
        RequestTokenError::Other(message) => AcquisitionErrorKind::MalformedResponse(message),
    }
}

/// Wrap an acquisition error kind with the request's API id and correlation id
pub(crate) fn acquisition_error(
    config: &ClientApplicationConfig,
    kind: AcquisitionErrorKind,
) -> AuthError {
    let telemetry = config.telemetry();
    AcquisitionError::new(telemetry.api_id(), telemetry.correlation_id(), kind).into()
}

/// Material binding an id token to the request that produced it
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct IdTokenBinding<'a> {
    /// Nonce sent on the authorization request
    pub nonce: Option<&'a str>,
    /// Authorization code that was redeemed
    pub code: Option<&'a str>,
}

/// Turns token responses into [`AuthenticationResult`]s
pub(crate) struct ResponseHandler<'a> {
    config: &'a ClientApplicationConfig,
    request: &'a BaseAuthRequest,
}

impl<'a> ResponseHandler<'a> {
    pub(crate) fn new(config: &'a ClientApplicationConfig, request: &'a BaseAuthRequest) -> Self {
        Self { config, request }
    }

    /// Validate, normalise and cache a token response
    ///
    /// `known_account` is used when the response does not identify the account
    /// itself (no id token and no `client_info`). Application tokens have
    /// neither and are cached under an empty home account id.
    pub(crate) async fn handle(
        &self,
        response: OidcTokenResponse,
        binding: IdTokenBinding<'_>,
        known_account: Option<&AccountInfo>,
    ) -> Result<AuthenticationResult, AuthError> {
        self.config.telemetry().clear_reported();

        let access_token = response.access_token().secret().clone();
        let fields = response.extra_fields();

        if let Some(id_token) = fields.id_token.as_deref()
            && self.config.configuration().auth.validate_id_tokens
        {
            self.validate_id_token(id_token, &access_token, binding)
                .await?;
        }

        let crypto = self.config.crypto();
        let claims = fields
            .id_token
            .as_deref()
            .map(|t| IdTokenClaims::decode_unverified(t, crypto.as_ref()))
            .transpose()
            .map_err(|kind| acquisition_error(self.config, kind))?;
        let client_info = fields
            .client_info
            .as_deref()
            .map(|raw| ClientInfo::decode(raw, crypto.as_ref()))
            .transpose()
            .map_err(|kind| acquisition_error(self.config, kind))?;

        let authority = self.config.authority().authority();
        let environment = authority.host().to_string();
        let account = if claims.is_some() || client_info.is_some() {
            let mut account =
                AccountInfo::from_response(&environment, client_info.as_ref(), claims.as_ref())
                    .map_err(|kind| acquisition_error(self.config, kind))?;
            if account.tenant_id.is_empty() {
                account.tenant_id = authority.tenant().unwrap_or_default().to_string();
            }
            Some(account)
        } else {
            known_account.cloned()
        };

        let scopes = match response.scopes() {
            Some(granted) if !granted.is_empty() => ScopeSet::new(granted.iter().map(|s| s.as_str())),
            _ => self.request.scopes().clone(),
        };
        let expires_in = response
            .expires_in()
            .map_or(DEFAULT_EXPIRES_IN, |d| d.as_secs());
        let expires_on = chrono::Utc::now()
            .timestamp()
            .saturating_add(i64::try_from(expires_in).unwrap_or(i64::MAX));
        let token_type = token_type_name(response.token_type());

        let client_id = self.config.configuration().auth.client_id.clone();
        let home_account_id = account
            .as_ref()
            .map(|a| a.home_account_id.clone())
            .unwrap_or_default();
        let realm = account
            .as_ref()
            .map(|a| a.tenant_id.clone())
            .or_else(|| authority.tenant().map(str::to_string))
            .unwrap_or_default();

        let record = CacheRecord {
            account: account.clone(),
            access_token: Some(AccessTokenEntity {
                home_account_id: home_account_id.clone(),
                environment: environment.clone(),
                client_id: client_id.clone(),
                realm: authority.tenant().unwrap_or_default().to_string(),
                scopes: scopes.clone(),
                secret: SecretString::new(access_token.clone()),
                token_type: token_type.clone(),
                expires_on,
            }),
            refresh_token: response
                .refresh_token()
                .filter(|_| account.is_some())
                .map(|rt| RefreshTokenEntity {
                    home_account_id: home_account_id.clone(),
                    environment: environment.clone(),
                    client_id: client_id.clone(),
                    secret: SecretString::new(rt.secret().clone()),
                }),
            id_token: fields
                .id_token
                .as_ref()
                .filter(|_| account.is_some())
                .map(|id_token| IdTokenEntity {
                    home_account_id: home_account_id.clone(),
                    environment: environment.clone(),
                    client_id: client_id.clone(),
                    realm: realm.clone(),
                    secret: id_token.clone(),
                }),
        };

        if let Err(e) = self.config.cache().save_record(record).await {
            warn!(error = %e, "Failed to write token response to the cache");
            return Err(acquisition_error(
                self.config,
                AcquisitionErrorKind::Cache(e.to_string()),
            ));
        }

        debug!(
            correlation_id = %self.request.correlation_id(),
            home_account_id = %self.config.configuration().logger.pii(&home_account_id),
            scopes = %scopes,
            "Token response processed"
        );

        Ok(AuthenticationResult {
            access_token,
            token_type,
            id_token: fields.id_token.clone(),
            id_token_claims: claims.clone(),
            account: account.map(|mut a| {
                a.id_token_claims = claims;
                a
            }),
            scopes,
            expires_on,
            correlation_id: self.request.correlation_id().to_string(),
            from_cache: false,
        })
    }

    async fn validate_id_token(
        &self,
        id_token: &str,
        access_token: &str,
        binding: IdTokenBinding<'_>,
    ) -> Result<(), AuthError> {
        let metadata = self.config.authority();
        let mut validation = ValidationConfig::new(
            [metadata.issuer()],
            [self.config.configuration().auth.client_id.as_str()],
        )
        .with_authority(metadata.authority().canonical())
        .with_access_token(access_token);
        if let Some(jwks_uri) = metadata.jwks_uri() {
            validation = validation.with_jwks_uri(jwks_uri);
        }
        if let Some(nonce) = binding.nonce {
            validation = validation.with_nonce(nonce);
        }
        if let Some(code) = binding.code {
            validation = validation.with_code(code);
        }

        self.config
            .validator()
            .validate_token(id_token, &validation)
            .await?;
        debug!(correlation_id = %self.request.correlation_id(), "Id token validated");
        Ok(())
    }
}

fn token_type_name(token_type: &BasicTokenType) -> String {
    match serde_json::to_value(token_type) {
        Ok(serde_json::Value::String(name)) if name.eq_ignore_ascii_case("bearer") => {
            "Bearer".to_string()
        }
        Ok(serde_json::Value::String(name)) => name,
        _ => "Bearer".to_string(),
    }
}

/// Build an [`AuthenticationResult`] for a cached access token
pub(crate) fn cached_result(
    token: &AccessTokenEntity,
    account: &AccountInfo,
    id_token: Option<String>,
    correlation_id: &str,
) -> AuthenticationResult {
    AuthenticationResult {
        access_token: token.secret.expose_secret().clone(),
        token_type: token.token_type.clone(),
        id_token,
        id_token_claims: account.id_token_claims.clone(),
        account: Some(account.clone()),
        scopes: token.scopes.clone(),
        expires_on: token.expires_on,
        correlation_id: correlation_id.to_string(),
        from_cache: true,
    }
}
