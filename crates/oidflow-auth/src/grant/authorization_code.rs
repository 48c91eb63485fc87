//! Authorization code grant
//!
//! [`AuthorizationCodeClient::get_auth_code_url`] builds the URL the user is
//! sent to; [`AuthorizationCodeClient::acquire_token`] redeems the code that
//! comes back on the redirect URI. PKCE (S256) is always used: the caller
//! either supplies its own challenge or keeps the generated verifier.

use oauth2::{AuthUrl, AuthorizationCode, ClientId, CsrfToken, PkceCodeVerifier};
use secrecy::ExposeSecret;
use tracing::debug;

use super::{
    AuthenticationResult, IdTokenBinding, OidcClient, ResponseHandler, acquisition_error,
    extra_parameters, http_client, redirect_url, scopes, token_client, token_error,
};
use crate::application::ClientApplicationConfig;
use crate::config::ProtocolMode;
use crate::crypto::PkceCodes;
use crate::error::{ConfigurationError, Result};
use crate::request::{AuthorizationCodeRequest, AuthorizationUrlRequest, BaseAuthRequest};

/// Authorization URL and the values the caller must keep for redemption
#[derive(Debug, Clone)]
pub struct AuthorizationUrl {
    /// URL to navigate the user to
    pub url: String,
    /// `state` sent on the URL
    pub state: String,
    /// `nonce` sent on the URL
    pub nonce: String,
    /// Generated PKCE codes; `None` when the caller supplied the challenge
    pub pkce: Option<PkceCodes>,
}

/// Builds authorization URLs and redeems authorization codes
#[derive(Debug, Clone)]
pub struct AuthorizationCodeClient {
    config: ClientApplicationConfig,
}

impl AuthorizationCodeClient {
    /// Client bound to `config`
    pub fn new(config: ClientApplicationConfig) -> Self {
        Self { config }
    }

    /// Build the authorization URL
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when no redirect URI is available or the
    /// authority has no authorization endpoint.
    pub fn get_auth_code_url(
        &self,
        request: &BaseAuthRequest,
        url_request: &AuthorizationUrlRequest,
    ) -> Result<AuthorizationUrl> {
        let endpoint = self.config.authority().authorization_endpoint()?;
        let auth_url =
            AuthUrl::new(endpoint.to_string()).map_err(|e| ConfigurationError::InvalidUrl {
                field: "authorization_endpoint",
                reason: e.to_string(),
            })?;
        let redirect_uri = self.redirect_uri(url_request.redirect_uri.as_deref())?;

        let client_id = ClientId::new(self.config.configuration().auth.client_id.clone());
        let client = OidcClient::new(client_id)
            .set_auth_uri(auth_url)
            .set_redirect_uri(redirect_url(redirect_uri)?);

        let crypto = self.config.crypto();
        let state = url_request
            .state
            .clone()
            .unwrap_or_else(|| crypto.create_new_guid());
        let nonce = url_request
            .nonce
            .clone()
            .unwrap_or_else(|| crypto.create_new_guid());
        let (challenge, pkce) = match &url_request.code_challenge {
            Some(challenge) => (challenge.clone(), None),
            None => {
                let codes = crypto.generate_pkce_codes();
                (codes.challenge.clone(), Some(codes))
            }
        };

        let csrf = state.clone();
        let mut authorize = client
            .authorize_url(move || CsrfToken::new(csrf))
            .add_scopes(scopes(request))
            .add_extra_param("nonce", nonce.clone())
            .add_extra_param("code_challenge", challenge)
            .add_extra_param("code_challenge_method", "S256")
            .add_extra_param("client-request-id", request.correlation_id().to_string());

        let optional = [
            ("prompt", url_request.prompt.as_ref()),
            ("login_hint", url_request.login_hint.as_ref()),
            ("response_mode", url_request.response_mode.as_ref()),
        ];
        for (name, value) in optional
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v.clone())))
        {
            authorize = authorize.add_extra_param(name, value);
        }
        if let Some(claims) = request.claims() {
            authorize = authorize.add_extra_param("claims", claims.to_string());
        }
        if self.config.configuration().auth.protocol_mode == ProtocolMode::Aad {
            authorize = authorize.add_extra_param("client_info", "1");
        }
        for (name, value) in &url_request.extra_query_parameters {
            authorize = authorize.add_extra_param(name.clone(), value.clone());
        }

        let (url, _) = authorize.url();
        debug!(correlation_id = %request.correlation_id(), "Authorization URL built");
        Ok(AuthorizationUrl {
            url: url.to_string(),
            state,
            nonce,
            pkce,
        })
    }

    /// Redeem an authorization code
    ///
    /// The id token in the response is bound to `code_request.nonce` and to the
    /// code itself (`c_hash`) when id token validation is enabled.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for a missing redirect URI or token
    /// endpoint, otherwise an acquisition error when redemption fails.
    pub async fn acquire_token(
        &self,
        request: &BaseAuthRequest,
        code_request: &AuthorizationCodeRequest,
    ) -> Result<AuthenticationResult> {
        let redirect_uri = self.redirect_uri(code_request.redirect_uri.as_deref())?;
        let client = token_client(&self.config)?.set_redirect_uri(redirect_url(redirect_uri)?);
        let http = http_client(&self.config);

        let mut token_request = client
            .exchange_code(AuthorizationCode::new(code_request.code.clone()))
            .add_extra_param("scope", request.scopes().to_string());
        if let Some(verifier) = &code_request.code_verifier {
            token_request =
                token_request.set_pkce_verifier(PkceCodeVerifier::new(verifier.expose_secret().clone()));
        }
        for (name, value) in extra_parameters(&self.config, request) {
            token_request = token_request.add_extra_param(name, value);
        }

        let response = token_request
            .request_async(&http)
            .await
            .map_err(|e| acquisition_error(&self.config, token_error(&self.config, e)))?;

        let binding = IdTokenBinding {
            nonce: code_request.nonce.as_deref(),
            code: Some(code_request.code.as_str()),
        };
        ResponseHandler::new(&self.config, request)
            .handle(response, binding, None)
            .await
    }

    fn redirect_uri<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str> {
        requested
            .or(self.config.configuration().auth.redirect_uri.as_deref())
            .ok_or_else(|| {
                ConfigurationError::InvalidRequest("a redirect_uri is required".to_string()).into()
            })
    }
}
