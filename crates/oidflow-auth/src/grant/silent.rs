//! Silent acquisition
//!
//! Serves a cached access token when one covers the requested scopes and is
//! not within the renewal offset of expiry. Otherwise the account's cached
//! refresh token is redeemed. A claims request or `force_refresh` skips the
//! access token lookup.

use tracing::{debug, info};

use super::refresh_token::RefreshTokenClient;
use super::{AuthenticationResult, acquisition_error, cached_result};
use crate::application::ClientApplicationConfig;
use crate::error::{AcquisitionErrorKind, AuthError, Result};
use crate::request::{BaseAuthRequest, SilentFlowRequest};
use crate::telemetry::record_cache_lookup;

/// Acquires tokens for a known account without user interaction
#[derive(Debug, Clone)]
pub struct SilentFlowClient {
    config: ClientApplicationConfig,
}

impl SilentFlowClient {
    /// Client bound to `config`
    pub fn new(config: ClientApplicationConfig) -> Self {
        Self { config }
    }

    /// Acquire a token for `silent.account`
    ///
    /// # Errors
    ///
    /// Returns an acquisition error with
    /// [`AcquisitionErrorKind::NoTokensFound`] when neither a usable access
    /// token nor a refresh token is cached, or the refresh token redemption
    /// error.
    pub async fn acquire_token(
        &self,
        request: &BaseAuthRequest,
        silent: &SilentFlowRequest,
    ) -> Result<AuthenticationResult> {
        let account = &silent.account;
        let client_id = &self.config.configuration().auth.client_id;
        let cache = self.config.cache();
        let cache_error =
            |e: crate::cache::CacheError| self.cache_error(AcquisitionErrorKind::Cache(e.to_string()));

        if !silent.force_refresh && request.claims().is_none() {
            let scopes = request.scopes().without_oidc_scopes();
            let offset = self.config.configuration().system.token_renewal_offset_seconds;
            let now = chrono::Utc::now().timestamp();

            let authority = self.config.authority().authority();
            let cached = cache
                .get_access_token(
                    &account.home_account_id,
                    client_id,
                    authority.host(),
                    authority.tenant().unwrap_or_default(),
                    &scopes,
                )
                .await
                .map_err(cache_error)?
                .filter(|t| !t.is_expiring(now, offset));
            record_cache_lookup(cached.is_some());

            if let Some(token) = cached {
                let id_token = cache
                    .get_id_token(&account.home_account_id, client_id)
                    .await
                    .map_err(cache_error)?
                    .map(|t| t.secret);
                self.config.telemetry().increment_cache_hits();
                debug!(
                    home_account_id = %self.config.configuration().logger.pii(&account.home_account_id),
                    "Serving access token from cache"
                );
                return Ok(cached_result(
                    &token,
                    account,
                    id_token,
                    request.correlation_id(),
                ));
            }
        }

        let Some(refresh_token) = cache
            .get_refresh_token(&account.home_account_id, client_id)
            .await
            .map_err(cache_error)?
        else {
            info!(
                home_account_id = %self.config.configuration().logger.pii(&account.home_account_id),
                "No refresh token cached for account"
            );
            return Err(self.cache_error(AcquisitionErrorKind::NoTokensFound));
        };

        debug!("Refreshing access token with the cached refresh token");
        RefreshTokenClient::new(self.config.clone())
            .acquire_token(request, &refresh_token.secret, Some(account))
            .await
    }

    fn cache_error(&self, kind: AcquisitionErrorKind) -> AuthError {
        acquisition_error(&self.config, kind)
    }
}
