//! Client application orchestrator
//!
//! [`ClientApplication`] is the entry point for token acquisition. Every
//! acquisition follows the same steps:
//!
//! 1. merge the caller's request with base defaults into a [`BaseAuthRequest`]
//!    (correlation id, authority, scopes, claims)
//! 2. open a [`ServerTelemetryManager`] scope keyed by API id and correlation id
//! 3. build a [`ClientApplicationConfig`] for the request's authority
//!    (authority metadata may be discovered over the network)
//! 4. dispatch to the grant client for the request variant
//!
//! A failure in steps 3 or 4 is recorded against the telemetry scope and
//! returned unchanged. There are no retries at this layer.

use std::fmt;
use std::sync::Arc;

use tracing::{Instrument, debug, info_span, warn};

use crate::account::AccountInfo;
use crate::authority::{Authority, AuthorityMetadata};
use crate::cache::{CacheError, InMemoryTokenCache, TokenCache};
use crate::config::Configuration;
use crate::crypto::{CryptoProvider, DefaultCryptoProvider};
use crate::error::{
    AcquisitionError, AcquisitionErrorKind, AuthError, ConfigurationError, Result,
};
use crate::grant::{
    AuthenticationResult, AuthorizationCodeClient, AuthorizationUrl, ClientCredentialClient,
    DeviceCodeClient, RefreshTokenClient, SilentFlowClient, UsernamePasswordClient,
};
use crate::jwt::{JwksCache, TokenValidationResult, TokenValidator, ValidationConfig};
use crate::network::{NetworkModule, ReqwestNetworkModule};
use crate::request::{
    AuthorizationCodeRequest, AuthorizationUrlRequest, BaseAuthRequest, ClientCredentialRequest,
    DeviceCodeRequest, GrantRequest, RefreshTokenRequest, RequestOptions, SilentFlowRequest,
    UsernamePasswordRequest,
};
use crate::telemetry::{ApiId, ServerTelemetryManager, TelemetryStore, record_acquisition};

/// Per-request client configuration
///
/// Built fresh for every acquisition because the authority can vary per call.
#[derive(Clone)]
pub struct ClientApplicationConfig {
    configuration: Arc<Configuration>,
    authority: AuthorityMetadata,
    network: Arc<dyn NetworkModule>,
    crypto: Arc<dyn CryptoProvider>,
    cache: Arc<dyn TokenCache>,
    telemetry: ServerTelemetryManager,
    validator: Arc<TokenValidator>,
}

impl ClientApplicationConfig {
    pub(crate) fn new(
        configuration: Arc<Configuration>,
        authority: AuthorityMetadata,
        network: Arc<dyn NetworkModule>,
        crypto: Arc<dyn CryptoProvider>,
        cache: Arc<dyn TokenCache>,
        telemetry: ServerTelemetryManager,
        validator: Arc<TokenValidator>,
    ) -> Self {
        Self {
            configuration,
            authority,
            network,
            crypto,
            cache,
            telemetry,
            validator,
        }
    }

    /// Application configuration
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Resolved metadata of the request's authority
    pub fn authority(&self) -> &AuthorityMetadata {
        &self.authority
    }

    /// Network module
    pub fn network(&self) -> Arc<dyn NetworkModule> {
        Arc::clone(&self.network)
    }

    /// Crypto provider
    pub fn crypto(&self) -> &Arc<dyn CryptoProvider> {
        &self.crypto
    }

    /// Token cache
    pub fn cache(&self) -> &Arc<dyn TokenCache> {
        &self.cache
    }

    /// Telemetry scope of the request
    pub fn telemetry(&self) -> &ServerTelemetryManager {
        &self.telemetry
    }

    /// Validator used for received id tokens
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }
}

impl fmt::Debug for ClientApplicationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientApplicationConfig")
            .field("client_id", &self.configuration.auth.client_id)
            .field("authority", &self.authority.authority().canonical())
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

/// OAuth 2.0 / OpenID Connect client application
#[derive(Clone)]
pub struct ClientApplication {
    configuration: Arc<Configuration>,
    network: Arc<dyn NetworkModule>,
    crypto: Arc<dyn CryptoProvider>,
    cache: Arc<dyn TokenCache>,
    telemetry: Arc<TelemetryStore>,
    validator: Arc<TokenValidator>,
}

impl fmt::Debug for ClientApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientApplication")
            .field("client_id", &self.configuration.auth.client_id)
            .field("authority", &self.configuration.auth.authority)
            .field("confidential", &self.configuration.auth.client_secret.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientApplication`]
///
/// Collaborators that are not supplied default to [`ReqwestNetworkModule`],
/// [`DefaultCryptoProvider`], [`InMemoryTokenCache`] and a fresh
/// [`TelemetryStore`].
pub struct ClientApplicationBuilder {
    configuration: Configuration,
    network: Option<Arc<dyn NetworkModule>>,
    crypto: Option<Arc<dyn CryptoProvider>>,
    cache: Option<Arc<dyn TokenCache>>,
    telemetry: Option<Arc<TelemetryStore>>,
}

impl ClientApplicationBuilder {
    /// Use a custom network module
    pub fn network(mut self, network: Arc<dyn NetworkModule>) -> Self {
        self.network = Some(network);
        self
    }

    /// Use a custom crypto provider
    pub fn crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Use a custom token cache
    pub fn cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share a telemetry store between applications
    pub fn telemetry_store(mut self, store: Arc<TelemetryStore>) -> Self {
        self.telemetry = Some(store);
        self
    }

    /// Build the application
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty client id, an invalid
    /// authority or redirect URI, or when the default network module cannot
    /// be created.
    pub fn build(self) -> Result<ClientApplication> {
        let configuration = self.configuration;
        configuration.validate()?;
        Authority::parse(&configuration.auth.authority, configuration.auth.protocol_mode)?;

        let network = match self.network {
            Some(network) => network,
            None => Arc::new(
                ReqwestNetworkModule::with_timeout(configuration.system.network_timeout())
                    .map_err(|e| {
                        ConfigurationError::InvalidRequest(format!(
                            "failed to create the default network module: {e}"
                        ))
                    })?,
            ),
        };
        let ttl = configuration.system.jwks_cache_ttl();
        let jwks = Arc::new(JwksCache::with_ttl(Arc::clone(&network), ttl));

        Ok(ClientApplication {
            network,
            crypto: self.crypto.unwrap_or_else(|| Arc::new(DefaultCryptoProvider)),
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(InMemoryTokenCache::new())),
            telemetry: self.telemetry.unwrap_or_default(),
            validator: Arc::new(TokenValidator::with_jwks_cache(jwks, ttl)),
            configuration: Arc::new(configuration),
        })
    }
}

impl ClientApplication {
    /// Start building an application for `configuration`
    pub fn builder(configuration: Configuration) -> ClientApplicationBuilder {
        ClientApplicationBuilder {
            configuration,
            network: None,
            crypto: None,
            cache: None,
            telemetry: None,
        }
    }

    /// Application with default collaborators
    ///
    /// # Errors
    ///
    /// See [`ClientApplicationBuilder::build`].
    pub fn new(configuration: Configuration) -> Result<Self> {
        Self::builder(configuration).build()
    }

    /// Application configuration
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Telemetry store shared by this application's requests
    pub fn telemetry_store(&self) -> &Arc<TelemetryStore> {
        &self.telemetry
    }

    /// Validator sharing this application's network module and JWKS cache
    pub fn token_validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Acquire a token for any grant
    ///
    /// Returns `Ok(None)` only when a device code flow is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigurationError`] of
    /// an invalid request, or the error of the grant client. Failures after
    /// the request was built are also recorded for server telemetry.
    pub async fn acquire_token(&self, request: GrantRequest) -> Result<Option<AuthenticationResult>> {
        let api_id = request.api_id();
        let base = self.base_request(request.options(), request.is_user_flow())?;
        let telemetry = ServerTelemetryManager::new(
            api_id,
            base.correlation_id(),
            request.force_refresh(),
            Arc::clone(&self.telemetry),
        );

        let span = info_span!(
            "acquire_token",
            api_id = %api_id,
            correlation_id = %base.correlation_id()
        );
        let result = self
            .dispatch(&request, &base, telemetry.clone())
            .instrument(span)
            .await;

        match &result {
            Ok(_) => record_acquisition(api_id, true),
            Err(e) => {
                warn!(
                    api_id = %api_id,
                    correlation_id = %base.correlation_id(),
                    error_code = %e.error_code(),
                    error = %e,
                    "Token acquisition failed"
                );
                telemetry.cache_failed_request(e.error_code());
                record_acquisition(api_id, false);
            }
        }
        result
    }

    /// Acquire a token with the device code flow
    ///
    /// # Errors
    ///
    /// See [`acquire_token`](Self::acquire_token).
    pub async fn acquire_token_by_device_code(
        &self,
        request: DeviceCodeRequest,
    ) -> Result<Option<AuthenticationResult>> {
        self.acquire_token(GrantRequest::DeviceCode(request)).await
    }

    /// Acquire a token with a username and password
    ///
    /// # Errors
    ///
    /// See [`acquire_token`](Self::acquire_token).
    pub async fn acquire_token_by_username_password(
        &self,
        request: UsernamePasswordRequest,
    ) -> Result<Option<AuthenticationResult>> {
        self.acquire_token(GrantRequest::UsernamePassword(request))
            .await
    }

    /// Redeem an authorization code
    ///
    /// # Errors
    ///
    /// See [`acquire_token`](Self::acquire_token).
    pub async fn acquire_token_by_code(
        &self,
        request: AuthorizationCodeRequest,
    ) -> Result<Option<AuthenticationResult>> {
        self.acquire_token(GrantRequest::AuthorizationCode(request))
            .await
    }

    /// Acquire a token for a known account from the cache or its refresh token
    ///
    /// # Errors
    ///
    /// See [`acquire_token`](Self::acquire_token).
    pub async fn acquire_token_silent(
        &self,
        request: SilentFlowRequest,
    ) -> Result<Option<AuthenticationResult>> {
        self.acquire_token(GrantRequest::Silent(request)).await
    }

    /// Redeem a refresh token held by the caller
    ///
    /// # Errors
    ///
    /// See [`acquire_token`](Self::acquire_token).
    pub async fn acquire_token_by_refresh_token(
        &self,
        request: RefreshTokenRequest,
    ) -> Result<Option<AuthenticationResult>> {
        self.acquire_token(GrantRequest::RefreshToken(request)).await
    }

    /// Acquire an application token (confidential clients only)
    ///
    /// # Errors
    ///
    /// See [`acquire_token`](Self::acquire_token).
    pub async fn acquire_token_by_client_credential(
        &self,
        request: ClientCredentialRequest,
    ) -> Result<Option<AuthenticationResult>> {
        self.acquire_token(GrantRequest::ClientCredential(request))
            .await
    }

    /// Build the URL that starts an authorization code flow
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid request, or an
    /// acquisition error when the authority cannot be resolved.
    pub async fn get_auth_code_url(&self, request: AuthorizationUrlRequest) -> Result<AuthorizationUrl> {
        let base = self.base_request(&request.options, true)?;
        let telemetry = ServerTelemetryManager::new(
            ApiId::AcquireTokenByCode,
            base.correlation_id(),
            false,
            Arc::clone(&self.telemetry),
        );
        let config = self.build_config(&base, telemetry).await?;
        AuthorizationCodeClient::new(config).get_auth_code_url(&base, &request)
    }

    /// Validate a token with this application's network module and JWKS cache
    ///
    /// # Errors
    ///
    /// See [`TokenValidator::validate_token`].
    pub async fn validate_token(
        &self,
        token: &str,
        config: &ValidationConfig,
    ) -> Result<TokenValidationResult> {
        self.validator.validate_token(token, config).await
    }

    /// All cached accounts
    ///
    /// # Errors
    ///
    /// Returns the cache backend's error.
    pub async fn get_all_accounts(&self) -> std::result::Result<Vec<AccountInfo>, CacheError> {
        self.cache.get_all_accounts().await
    }

    /// Cached account with `home_account_id`
    ///
    /// # Errors
    ///
    /// Returns the cache backend's error.
    pub async fn get_account_by_home_id(
        &self,
        home_account_id: &str,
    ) -> std::result::Result<Option<AccountInfo>, CacheError> {
        self.cache.get_account(home_account_id).await
    }

    /// Remove an account and its tokens from the cache
    ///
    /// # Errors
    ///
    /// Returns the cache backend's error.
    pub async fn remove_account(&self, account: &AccountInfo) -> std::result::Result<bool, CacheError> {
        debug!(
            home_account_id = %self.configuration.logger.pii(&account.home_account_id),
            "Removing account"
        );
        self.cache.remove_account(&account.home_account_id).await
    }

    /// Resolve the request's authority into a per-request configuration
    ///
    /// Configured authority metadata is only used for the configured authority.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidAuthority`]
    /// for a malformed authority, or an acquisition error with
    /// [`AcquisitionErrorKind::AuthorityResolution`] when discovery fails.
    pub async fn build_config(
        &self,
        request: &BaseAuthRequest,
        telemetry: ServerTelemetryManager,
    ) -> Result<ClientApplicationConfig> {
        let auth = &self.configuration.auth;
        let authority = Authority::parse(request.authority(), auth.protocol_mode)?;
        let configured = Authority::parse(&auth.authority, auth.protocol_mode)?;
        let metadata_override = auth
            .authority_metadata
            .as_deref()
            .filter(|_| authority == configured);

        let metadata = authority
            .resolve(self.network.as_ref(), metadata_override)
            .await
            .map_err(|e| {
                AuthError::from(AcquisitionError::new(
                    telemetry.api_id(),
                    telemetry.correlation_id(),
                    AcquisitionErrorKind::AuthorityResolution(e),
                ))
            })?;

        debug!(
            authority = %authority.canonical(),
            issuer = %metadata.issuer(),
            "Authority resolved"
        );

        Ok(ClientApplicationConfig::new(
            Arc::clone(&self.configuration),
            metadata,
            Arc::clone(&self.network),
            Arc::clone(&self.crypto),
            Arc::clone(&self.cache),
            telemetry,
            Arc::clone(&self.validator),
        ))
    }

    fn base_request(&self, options: &RequestOptions, user_flow: bool) -> Result<BaseAuthRequest> {
        let auth = &self.configuration.auth;
        Ok(BaseAuthRequest::builder(auth.authority.clone())
            .options(options)
            .client_capabilities(&auth.client_capabilities)
            .include_oidc_scopes(user_flow)
            .build(self.crypto.as_ref())?)
    }

    async fn dispatch(
        &self,
        request: &GrantRequest,
        base: &BaseAuthRequest,
        telemetry: ServerTelemetryManager,
    ) -> Result<Option<AuthenticationResult>> {
        let config = self.build_config(base, telemetry).await?;
        debug!(scopes = %base.scopes(), "Dispatching token request");

        match request {
            GrantRequest::DeviceCode(r) => DeviceCodeClient::new(config).acquire_token(base, r).await,
            GrantRequest::UsernamePassword(r) => UsernamePasswordClient::new(config)
                .acquire_token(base, &r.username, &r.password)
                .await
                .map(Some),
            GrantRequest::AuthorizationCode(r) => AuthorizationCodeClient::new(config)
                .acquire_token(base, r)
                .await
                .map(Some),
            GrantRequest::Silent(r) => SilentFlowClient::new(config)
                .acquire_token(base, r)
                .await
                .map(Some),
            GrantRequest::RefreshToken(r) => RefreshTokenClient::new(config)
                .acquire_token(base, &r.refresh_token, None)
                .await
                .map(Some),
            GrantRequest::ClientCredential(_) => ClientCredentialClient::new(config)
                .acquire_token(base, false)
                .await
                .map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolMode;
    use crate::test_support::{PanicNetwork, StaticNetwork};

    const AUTHORITY: &str = "https://login.example.com/tenant-1/";
    const TOKEN_ENDPOINT: &str = "https://login.example.com/tenant-1/token";

    fn discovery() -> serde_json::Value {
        serde_json::json!({
            "issuer": AUTHORITY,
            "authorization_endpoint": "https://login.example.com/tenant-1/authorize",
            "token_endpoint": TOKEN_ENDPOINT,
            "jwks_uri": "https://login.example.com/tenant-1/keys"
        })
    }

    fn app(network: Arc<dyn NetworkModule>, configuration: Configuration) -> ClientApplication {
        ClientApplication::builder(configuration)
            .network(network)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_rejects_invalid_configuration() {
        let err = ClientApplication::builder(Configuration::new("app-1", "http://login.example.com/"))
            .network(Arc::new(PanicNetwork))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_authority");

        let err = ClientApplication::builder(Configuration::new(" ", AUTHORITY))
            .network(Arc::new(PanicNetwork))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_network() {
        let app = app(
            Arc::new(PanicNetwork),
            Configuration::new("app-1", AUTHORITY).with_client_secret("s"),
        );
        let err = app
            .acquire_token_by_client_credential(ClientCredentialRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_request");
        assert_eq!(app.telemetry_store().pending_failures(), 0);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_recorded() {
        let network = Arc::new(StaticNetwork::default().with(
            "https://login.example.com/tenant-1/.well-known/openid-configuration",
            500,
            serde_json::json!({}),
        ));
        let app = app(network, Configuration::new("app-1", AUTHORITY));

        let mut options = RequestOptions::with_scopes(["User.Read"]);
        options.correlation_id = Some("corr-7".to_string());
        let err = app
            .acquire_token_by_refresh_token(RefreshTokenRequest {
                options,
                refresh_token: secrecy::SecretString::new("rt".to_string()),
            })
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "authority_resolution_failed");
        match &err {
            AuthError::Acquisition(e) => {
                assert_eq!(e.api_id, ApiId::AcquireTokenByRefreshToken);
                assert_eq!(e.correlation_id, "corr-7");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(app.telemetry_store().pending_failures(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_reported_on_next_request() {
        let discovery_url = "https://login.example.com/tenant-1/.well-known/openid-configuration";
        let network = Arc::new(
            StaticNetwork::default()
                .with(discovery_url, 200, discovery())
                .with(
                    TOKEN_ENDPOINT,
                    400,
                    serde_json::json!({"error": "invalid_grant"}),
                ),
        );
        let app = app(network.clone(), Configuration::new("app-1", AUTHORITY));

        let request = |corr: &str| {
            let mut options = RequestOptions::with_scopes(["User.Read"]);
            options.correlation_id = Some(corr.to_string());
            RefreshTokenRequest {
                options,
                refresh_token: secrecy::SecretString::new("rt".to_string()),
            }
        };

        let err = app
            .acquire_token_by_refresh_token(request("corr-1"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_grant");
        assert_eq!(app.telemetry_store().pending_failures(), 1);

        app.acquire_token_by_refresh_token(request("corr-2"))
            .await
            .unwrap_err();

        let calls = network.calls_to(TOKEN_ENDPOINT);
        assert_eq!(calls[0].header("x-client-last-telemetry"), Some("5|0|||"));
        assert_eq!(
            calls[1].header("x-client-last-telemetry"),
            Some("5|0|872,corr-1|invalid_grant|")
        );
        // The first failure was reported and cleared; the second is pending
        assert_eq!(app.telemetry_store().pending_failures(), 1);
    }

    #[tokio::test]
    async fn test_application_tokens_stay_with_their_tenant() {
        let mut network = StaticNetwork::default();
        for tenant in ["tenant-1", "tenant-2"] {
            let authority = format!("https://login.example.com/{tenant}/");
            network = network
                .with(
                    &format!("{authority}.well-known/openid-configuration"),
                    200,
                    serde_json::json!({
                        "issuer": authority,
                        "authorization_endpoint": format!("{authority}authorize"),
                        "token_endpoint": format!("{authority}token"),
                    }),
                )
                .with(
                    &format!("{authority}token"),
                    200,
                    serde_json::json!({
                        "access_token": format!("token-for-{tenant}"),
                        "token_type": "Bearer",
                        "expires_in": 3600
                    }),
                );
        }
        let network = Arc::new(network);
        let app = app(
            network.clone(),
            Configuration::new("app-1", AUTHORITY).with_client_secret("s3cret"),
        );

        let request = |authority: Option<&str>| {
            let mut options = RequestOptions::with_scopes(["api://backend/.default"]);
            options.authority = authority.map(str::to_string);
            ClientCredentialRequest { options }
        };

        let first = app
            .acquire_token_by_client_credential(request(None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.access_token, "token-for-tenant-1");

        let second = app
            .acquire_token_by_client_credential(request(Some("https://login.example.com/tenant-2/")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.access_token, "token-for-tenant-2");
        assert!(!second.from_cache);
        assert_eq!(network.calls_to("https://login.example.com/tenant-2/token").len(), 1);

        let again = app
            .acquire_token_by_client_credential(request(None))
            .await
            .unwrap()
            .unwrap();
        assert!(again.from_cache);
        assert_eq!(again.access_token, "token-for-tenant-1");
    }

    #[tokio::test]
    async fn test_configured_metadata_skips_discovery() {
        let network = Arc::new(StaticNetwork::default());
        let app = app(
            network.clone(),
            Configuration::new("app-1", AUTHORITY)
                .with_authority_metadata(discovery().to_string())
                .with_redirect_uri("http://localhost/cb"),
        );

        let url = app
            .get_auth_code_url(AuthorizationUrlRequest::default())
            .await
            .unwrap();
        assert!(url.url.starts_with("https://login.example.com/tenant-1/authorize"));
        assert_eq!(network.call_count(), 0);
    }

    #[tokio::test]
    async fn test_aad_requests_client_info() {
        let metadata = serde_json::json!({
            "issuer": "https://login.example.com/{tenant}/v2.0",
            "authorization_endpoint": "https://login.example.com/{tenant}/oauth2/v2.0/authorize",
            "token_endpoint": "https://login.example.com/{tenant}/oauth2/v2.0/token",
        });
        let token_endpoint = "https://login.example.com/tenant-1/oauth2/v2.0/token";
        let network = Arc::new(StaticNetwork::default().with(
            token_endpoint,
            200,
            serde_json::json!({
                "access_token": "at",
                "token_type": "Bearer",
                "expires_in": 3600,
                // {"uid":"u1","utid":"t1"}
                "client_info": "eyJ1aWQiOiJ1MSIsInV0aWQiOiJ0MSJ9"
            }),
        ));
        let app = app(
            network.clone(),
            Configuration::new("app-1", AUTHORITY)
                .with_protocol_mode(ProtocolMode::Aad)
                .with_authority_metadata(metadata.to_string()),
        );

        let result = app
            .acquire_token_by_username_password(UsernamePasswordRequest {
                options: RequestOptions::with_scopes(["User.Read"]),
                username: "alice@example.com".to_string(),
                password: secrecy::SecretString::new("pw".to_string()),
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.account.unwrap().home_account_id, "u1.t1");
        let call = &network.calls_to(token_endpoint)[0];
        assert_eq!(call.form_field("client_info").as_deref(), Some("1"));
        assert_eq!(
            app.get_all_accounts().await.unwrap()[0].home_account_id,
            "u1.t1"
        );
    }
}
