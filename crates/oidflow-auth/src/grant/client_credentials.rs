//! Client credentials grant for confidential clients
//!
//! Application tokens are cached under an empty home account id and served
//! from the cache until they come within the renewal offset of expiry.

use tracing::debug;

use super::{
    AuthenticationResult, IdTokenBinding, ResponseHandler, acquisition_error, extra_parameters,
    http_client, scopes, token_client, token_error,
};
use crate::application::ClientApplicationConfig;
use crate::error::{AcquisitionErrorKind, ConfigurationError, Result};
use crate::request::BaseAuthRequest;
use crate::telemetry::record_cache_lookup;
use secrecy::ExposeSecret;

/// Acquires application tokens with the client's own credentials
#[derive(Debug, Clone)]
pub struct ClientCredentialClient {
    config: ClientApplicationConfig,
}

impl ClientCredentialClient {
    /// Client bound to `config`
    pub fn new(config: ClientApplicationConfig) -> Self {
        Self { config }
    }

    /// Acquire an application token
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingClientSecret`] for public clients,
    /// otherwise an acquisition error when the token endpoint fails.
    pub async fn acquire_token(
        &self,
        request: &BaseAuthRequest,
        force_refresh: bool,
    ) -> Result<AuthenticationResult> {
        if self.config.configuration().auth.client_secret.is_none() {
            return Err(ConfigurationError::MissingClientSecret.into());
        }

        if !force_refresh
            && request.claims().is_none()
            && let Some(result) = self.cached(request).await?
        {
            return Ok(result);
        }

        let client = token_client(&self.config)?;
        let http = http_client(&self.config);

        let mut token_request = client
            .exchange_client_credentials()
            .add_scopes(scopes(request));
        for (name, value) in extra_parameters(&self.config, request) {
            token_request = token_request.add_extra_param(name, value);
        }

        let response = token_request
            .request_async(&http)
            .await
            .map_err(|e| acquisition_error(&self.config, token_error(&self.config, e)))?;

        ResponseHandler::new(&self.config, request)
            .handle(response, IdTokenBinding::default(), None)
            .await
    }

    async fn cached(&self, request: &BaseAuthRequest) -> Result<Option<AuthenticationResult>> {
        let client_id = &self.config.configuration().auth.client_id;
        let authority = self.config.authority().authority();
        let token = self
            .config
            .cache()
            .get_access_token(
                "",
                client_id,
                authority.host(),
                authority.tenant().unwrap_or_default(),
                request.scopes(),
            )
            .await
            .map_err(|e| {
                acquisition_error(&self.config, AcquisitionErrorKind::Cache(e.to_string()))
            })?;

        let offset = self.config.configuration().system.token_renewal_offset_seconds;
        let now = chrono::Utc::now().timestamp();
        let Some(token) = token.filter(|t| !t.is_expiring(now, offset)) else {
            record_cache_lookup(false);
            return Ok(None);
        };

        record_cache_lookup(true);
        self.config.telemetry().increment_cache_hits();
        debug!(scopes = %token.scopes, "Serving application token from cache");
        Ok(Some(AuthenticationResult {
            access_token: token.secret.expose_secret().clone(),
            token_type: token.token_type.clone(),
            id_token: None,
            id_token_claims: None,
            account: None,
            scopes: token.scopes.clone(),
            expires_on: token.expires_on,
            correlation_id: request.correlation_id().to_string(),
            from_cache: true,
        }))
    }
}
