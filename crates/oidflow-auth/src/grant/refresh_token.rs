//! Refresh token redemption

use oauth2::RefreshToken;
use secrecy::{ExposeSecret, SecretString};

use super::{
    AuthenticationResult, IdTokenBinding, ResponseHandler, acquisition_error, extra_parameters,
    http_client, scopes, token_client, token_error,
};
use crate::account::AccountInfo;
use crate::application::ClientApplicationConfig;
use crate::error::Result;
use crate::request::BaseAuthRequest;

/// Exchanges a refresh token for new tokens
#[derive(Debug, Clone)]
pub struct RefreshTokenClient {
    config: ClientApplicationConfig,
}

impl RefreshTokenClient {
    /// Client bound to `config`
    pub fn new(config: ClientApplicationConfig) -> Self {
        Self { config }
    }

    /// Redeem `refresh_token`
    ///
    /// `account` is attached to the result when the response does not carry
    /// an id token of its own.
    ///
    /// # Errors
    ///
    /// Returns an acquisition error when the refresh token is rejected or the
    /// token endpoint cannot be reached.
    pub async fn acquire_token(
        &self,
        request: &BaseAuthRequest,
        refresh_token: &SecretString,
        account: Option<&AccountInfo>,
    ) -> Result<AuthenticationResult> {
        let client = token_client(&self.config)?;
        let http = http_client(&self.config);
        let refresh_token = RefreshToken::new(refresh_token.expose_secret().clone());

        let mut token_request = client
            .exchange_refresh_token(&refresh_token)
            .add_scopes(scopes(request));
        for (name, value) in extra_parameters(&self.config, request) {
            token_request = token_request.add_extra_param(name, value);
        }

        let response = token_request
            .request_async(&http)
            .await
            .map_err(|e| acquisition_error(&self.config, token_error(&self.config, e)))?;

        ResponseHandler::new(&self.config, request)
            .handle(response, IdTokenBinding::default(), account)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::cache::InMemoryTokenCache;
    use crate::telemetry::ApiId;
    use crate::test_support::StaticNetwork;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_refresh_grant_keeps_known_account() {
        let network = Arc::new(StaticNetwork::default().with(
            TOKEN_ENDPOINT,
            200,
            serde_json::json!({
                "access_token": "at-2",
                "token_type": "Bearer",
                "expires_in": 3600
            }),
        ));
        let config = config(
            configuration(),
            network.clone(),
            Arc::new(InMemoryTokenCache::new()),
            ApiId::AcquireTokenByRefreshToken,
        )
        .await;

        let account = AccountInfo {
            home_account_id: "alice-sub".into(),
            environment: "login.example.com".into(),
            tenant_id: "tenant-1".into(),
            username: "alice@example.com".into(),
            local_account_id: "alice-oid".into(),
            name: None,
            id_token_claims: None,
        };
        let result = RefreshTokenClient::new(config)
            .acquire_token(
                &request(&["User.Read"]),
                &SecretString::new("rt-1".to_string()),
                Some(&account),
            )
            .await
            .unwrap();

        assert_eq!(result.access_token, "at-2");
        assert_eq!(result.account.unwrap().home_account_id, "alice-sub");

        let call = &network.calls_to(TOKEN_ENDPOINT)[0];
        assert_eq!(call.form_field("grant_type").as_deref(), Some("refresh_token"));
        assert_eq!(call.form_field("refresh_token").as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn test_claims_are_sent() {
        let network = Arc::new(StaticNetwork::default().with(
            TOKEN_ENDPOINT,
            200,
            token_response(Some(alice_id_token())),
        ));
        let config = config(
            configuration(),
            network.clone(),
            Arc::new(InMemoryTokenCache::new()),
            ApiId::AcquireTokenByRefreshToken,
        )
        .await;

        let request = BaseAuthRequest::builder(AUTHORITY)
            .scopes(["User.Read"])
            .claims(r#"{"access_token":{"acrs":{"essential":true}}}"#)
            .build(&crate::crypto::DefaultCryptoProvider)
            .unwrap();
        RefreshTokenClient::new(config)
            .acquire_token(&request, &SecretString::new("rt-1".to_string()), None)
            .await
            .unwrap();

        let claims = network.calls_to(TOKEN_ENDPOINT)[0]
            .form_field("claims")
            .unwrap();
        assert!(claims.contains("acrs"));
    }
}
