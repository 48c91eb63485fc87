//! Resource owner password credentials grant

use oauth2::{ResourceOwnerPassword, ResourceOwnerUsername};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{
    AuthenticationResult, IdTokenBinding, ResponseHandler, acquisition_error, extra_parameters,
    http_client, scopes, token_client, token_error,
};
use crate::application::ClientApplicationConfig;
use crate::error::Result;
use crate::request::BaseAuthRequest;

/// Exchanges a username and password for tokens
#[derive(Debug, Clone)]
pub struct UsernamePasswordClient {
    config: ClientApplicationConfig,
}

impl UsernamePasswordClient {
    /// Client bound to `config`
    pub fn new(config: ClientApplicationConfig) -> Self {
        Self { config }
    }

    /// Redeem the user's credentials
    ///
    /// # Errors
    ///
    /// Returns an acquisition error when the token endpoint rejects the
    /// credentials or cannot be reached.
    pub async fn acquire_token(
        &self,
        request: &BaseAuthRequest,
        username: &str,
        password: &SecretString,
    ) -> Result<AuthenticationResult> {
        debug!(
            username = %self.config.configuration().logger.pii(username),
            "Acquiring token with username and password"
        );

        let client = token_client(&self.config)?;
        let http = http_client(&self.config);
        let username = ResourceOwnerUsername::new(username.to_string());
        let password = ResourceOwnerPassword::new(password.expose_secret().clone());

        let mut token_request = client
            .exchange_password(&username, &password)
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
}
