//! Pluggable network module
//!
//! All I/O the crate performs (discovery documents, JWKS, token endpoints) goes
//! through a [`NetworkModule`]. Hosts can supply their own transport; the
//! default is [`ReqwestNetworkModule`].
//!
//! The oauth2 crate drives the grant requests through [`OAuthHttpClient`], an
//! adapter that routes `oauth2::AsyncHttpClient` calls into the same module so
//! every request shares one transport, one set of client headers and one place
//! to stub in tests.

mod oauth_adapter;
mod reqwest_module;

pub use oauth_adapter::OAuthHttpClient;
pub use reqwest_module::ReqwestNetworkModule;

use async_trait::async_trait;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Transport-level failure
#[derive(Debug, Error, Clone)]
pub enum NetworkError {
    /// Request could not be executed
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// Request or response header was invalid
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// Response body could not be read
    #[error("Failed to read response body: {0}")]
    BodyRead(String),

    /// HTTP method is not supported by the module
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}

/// Options for a single request
#[derive(Debug, Clone, Default)]
pub struct NetworkRequestOptions {
    /// Extra request headers
    pub headers: HeaderMap,
    /// Request body (POST only)
    pub body: Option<Vec<u8>>,
}

impl NetworkRequestOptions {
    /// Options carrying only headers
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            body: None,
        }
    }
}

/// Raw response handed back by a [`NetworkModule`]
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Vec<u8>,
}

impl NetworkResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    ///
    /// Returns the serde error when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Async HTTP transport used for every outbound call
#[async_trait]
pub trait NetworkModule: Send + Sync + std::fmt::Debug {
    /// Perform a GET request
    async fn send_get_request(
        &self,
        url: &str,
        options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError>;

    /// Perform a POST request
    async fn send_post_request(
        &self,
        url: &str,
        options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError>;
}

/// Whether `url` may be fetched: https anywhere, http only on loopback hosts
pub(crate) fn is_allowed_endpoint(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.scheme() {
            "https" => true,
            "http" => matches!(
                parsed.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("[::1]")
            ),
            _ => false,
        },
        Err(_) => false,
    }
}
