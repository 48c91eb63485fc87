//! Device authorization grant (RFC 8628)
//!
//! The device code is requested from the authority's device authorization
//! endpoint and handed to the caller's callback. The token endpoint is then
//! polled at the server's interval until the user completes sign-in, the code
//! expires, the optional timeout elapses or the caller cancels.

use oauth2::{DeviceAuthorizationResponse, DeviceAuthorizationUrl, ExtraDeviceAuthorizationFields};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    AuthenticationResult, IdTokenBinding, ResponseHandler, acquisition_error, extra_parameters,
    http_client, scopes, token_client, token_error,
};
use crate::application::ClientApplicationConfig;
use crate::error::{AcquisitionErrorKind, ConfigurationError, Result};
use crate::request::{BaseAuthRequest, DeviceCodeInfo, DeviceCodeRequest};

/// Non-standard fields of the device authorization response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DeviceCodeFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ExtraDeviceAuthorizationFields for DeviceCodeFields {}

/// Acquires tokens through the device code flow
#[derive(Debug, Clone)]
pub struct DeviceCodeClient {
    config: ClientApplicationConfig,
}

impl DeviceCodeClient {
    /// Client bound to `config`
    pub fn new(config: ClientApplicationConfig) -> Self {
        Self { config }
    }

    /// Run the device code flow
    ///
    /// Returns `Ok(None)` when the request's cancellation token fires before
    /// the user completes sign-in.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingEndpoint`] when the authority has no
    /// device authorization endpoint, an acquisition error with
    /// [`AcquisitionErrorKind::DeviceCodeExpired`] when the code expires, or
    /// any other token endpoint failure.
    pub async fn acquire_token(
        &self,
        request: &BaseAuthRequest,
        device: &DeviceCodeRequest,
    ) -> Result<Option<AuthenticationResult>> {
        let endpoint = self.config.authority().device_authorization_endpoint()?;
        let device_url =
            DeviceAuthorizationUrl::new(endpoint).map_err(|e| ConfigurationError::InvalidUrl {
                field: "device_authorization_endpoint",
                reason: e.to_string(),
            })?;
        let client = token_client(&self.config)?.set_device_authorization_url(device_url);
        let http = http_client(&self.config);
        let extra = extra_parameters(&self.config, request);

        let mut code_request = client.exchange_device_code().add_scopes(scopes(request));
        for (name, value) in extra.iter().cloned() {
            code_request = code_request.add_extra_param(name, value);
        }
        let details: DeviceAuthorizationResponse<DeviceCodeFields> = code_request
            .request_async(&http)
            .await
            .map_err(|e| acquisition_error(&self.config, token_error(&self.config, e)))?;

        let info = device_code_info(&details);
        info!(
            verification_uri = %info.verification_uri,
            expires_in_secs = info.expires_in.as_secs(),
            "Device code issued"
        );
        (device.device_code_callback)(&info);

        let mut token_request = client.exchange_device_access_token(&details);
        for (name, value) in extra {
            token_request = token_request.add_extra_param(name, value);
        }
        let poll = token_request.request_async(&http, tokio::time::sleep, device.timeout);

        let outcome = match &device.cancellation {
            Some(cancellation) => tokio::select! {
                biased;
                () = cancellation.cancelled() => {
                    info!("Device code flow cancelled by the caller");
                    return Ok(None);
                }
                outcome = poll => outcome,
            },
            None => poll.await,
        };

        let response = outcome.map_err(|e| {
            let kind = match token_error(&self.config, e) {
                AcquisitionErrorKind::ServerError { error, .. } if error == "expired_token" => {
                    AcquisitionErrorKind::DeviceCodeExpired
                }
                other => other,
            };
            acquisition_error(&self.config, kind)
        })?;

        debug!("Device code redeemed");
        ResponseHandler::new(&self.config, request)
            .handle(response, IdTokenBinding::default(), None)
            .await
            .map(Some)
    }
}

fn device_code_info(details: &DeviceAuthorizationResponse<DeviceCodeFields>) -> DeviceCodeInfo {
    let user_code = details.user_code().secret().clone();
    let verification_uri = details.verification_uri().as_str().to_string();
    let message = details.extra_fields().message.clone().unwrap_or_else(|| {
        format!(
            "To sign in, use a web browser to open the page {verification_uri} and enter the code {user_code} to authenticate."
        )
    });
    DeviceCodeInfo {
        user_code,
        verification_uri,
        expires_in: details.expires_in(),
        interval: details.interval(),
        message,
    }
}
