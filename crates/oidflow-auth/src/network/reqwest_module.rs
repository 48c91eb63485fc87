//! Default [`NetworkModule`] backed by reqwest
//!
//! Configured to:
//! - NOT follow redirects (token and key endpoints must answer directly)
//! - use rustls for TLS
//! - time out after 30 seconds unless overridden

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};

use super::{NetworkError, NetworkModule, NetworkRequestOptions, NetworkResponse};

/// reqwest-backed network module
#[derive(Clone)]
pub struct ReqwestNetworkModule {
    inner: reqwest::Client,
}

impl ReqwestNetworkModule {
    /// Create a module with a 30 second timeout and redirects disabled
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built (TLS backend
    /// initialisation failure).
    pub fn new() -> Result<Self, NetworkError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a module with a custom timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, NetworkError> {
        let inner = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Request(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { inner })
    }

    /// Wrap an existing reqwest client
    ///
    /// # Warning
    /// Ensure the client is configured with `redirect::Policy::none()`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { inner: client }
    }

    async fn execute(
        &self,
        method: reqwest::Method,
        url: &str,
        options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError> {
        let mut req_builder = self.inner.request(method, url);

        for (name, value) in options.headers.iter() {
            req_builder = req_builder.header(name.as_str(), value.as_bytes());
        }

        if let Some(body) = options.body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| NetworkError::Request(e.to_string()))?;

        let status = response.status().as_u16();

        let mut headers = HeaderMap::new();
        for (name, value) in response.headers().iter() {
            let name = HeaderName::from_bytes(name.as_str().as_bytes())
                .map_err(|e| NetworkError::InvalidHeader(e.to_string()))?;
            let value = HeaderValue::from_bytes(value.as_bytes())
                .map_err(|e| NetworkError::InvalidHeader(e.to_string()))?;
            headers.append(name, value);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::BodyRead(e.to_string()))?
            .to_vec();

        Ok(NetworkResponse {
            status,
            headers,
            body,
        })
    }
}

impl std::fmt::Debug for ReqwestNetworkModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestNetworkModule")
            .field("inner", &"<reqwest::Client>")
            .finish()
    }
}

#[async_trait]
impl NetworkModule for ReqwestNetworkModule {
    async fn send_get_request(
        &self,
        url: &str,
        options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError> {
        self.execute(reqwest::Method::GET, url, options).await
    }

    async fn send_post_request(
        &self,
        url: &str,
        options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError> {
        self.execute(reqwest::Method::POST, url, options).await
    }
}
