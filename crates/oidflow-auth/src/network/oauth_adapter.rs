//! oauth2 adapter over a [`NetworkModule`]
//!
//! The oauth2 crate builds well-formed token requests but wants to execute
//! them through its own `AsyncHttpClient` trait. This adapter implements that
//! trait on top of whatever [`NetworkModule`] the application was configured
//! with, and stamps every outgoing request with the per-request headers
//! (client SKU, correlation id, server telemetry).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue};
use oauth2::AsyncHttpClient;

use super::{NetworkError, NetworkModule, NetworkRequestOptions};

/// Type alias for the HTTP request used by oauth2
pub type HttpRequest = oauth2::http::Request<Vec<u8>>;
/// Type alias for the HTTP response used by oauth2
pub type HttpResponse = oauth2::http::Response<Vec<u8>>;

/// `oauth2::AsyncHttpClient` implementation routed through a [`NetworkModule`]
#[derive(Clone)]
pub struct OAuthHttpClient {
    network: Arc<dyn NetworkModule>,
    headers: HeaderMap,
}

impl OAuthHttpClient {
    /// Create an adapter with no extra headers
    pub fn new(network: Arc<dyn NetworkModule>) -> Self {
        Self {
            network,
            headers: HeaderMap::new(),
        }
    }

    /// Add a header sent with every request made through this adapter
    ///
    /// Invalid header names or values are skipped with a warning.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!(header = name, "Skipping invalid request header"),
        }
        self
    }

    /// Extra headers attached to each request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let (parts, body) = request.into_parts();
        let url = parts.uri.to_string();

        let mut headers = HeaderMap::new();
        for (name, value) in parts.headers.iter() {
            let name = HeaderName::from_bytes(name.as_str().as_bytes())
                .map_err(|e| NetworkError::InvalidHeader(e.to_string()))?;
            let value = HeaderValue::from_bytes(value.as_bytes())
                .map_err(|e| NetworkError::InvalidHeader(e.to_string()))?;
            headers.append(name, value);
        }
        for (name, value) in self.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        let response = match parts.method.as_str() {
            "GET" => {
                self.network
                    .send_get_request(&url, NetworkRequestOptions::with_headers(headers))
                    .await?
            }
            "POST" => {
                let options = NetworkRequestOptions {
                    headers,
                    body: Some(body),
                };
                self.network.send_post_request(&url, options).await?
            }
            other => return Err(NetworkError::UnsupportedMethod(other.to_string())),
        };

        let status = oauth2::http::StatusCode::from_u16(response.status)
            .map_err(|_| NetworkError::InvalidHeader("Invalid status code".to_string()))?;

        let mut builder = oauth2::http::Response::builder().status(status);
        for (name, value) in response.headers.iter() {
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        builder
            .body(response.body)
            .map_err(|e| NetworkError::InvalidHeader(e.to_string()))
    }
}

impl std::fmt::Debug for OAuthHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthHttpClient")
            .field("network", &self.network)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Future type for the adapter
pub type OAuthHttpFuture<'c> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, NetworkError>> + Send + 'c>>;

impl<'c> AsyncHttpClient<'c> for OAuthHttpClient {
    type Error = NetworkError;
    type Future = OAuthHttpFuture<'c>;

    fn call(&'c self, request: HttpRequest) -> Self::Future {
        Box::pin(async move { self.execute(request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingNetwork {
        seen: Mutex<Vec<(String, String, HeaderMap, Option<Vec<u8>>)>>,
    }

    #[async_trait]
    impl NetworkModule for RecordingNetwork {
        async fn send_get_request(
            &self,
            url: &str,
            options: NetworkRequestOptions,
        ) -> Result<NetworkResponse, NetworkError> {
            self.seen.lock().unwrap().push((
                "GET".to_string(),
                url.to_string(),
                options.headers,
                options.body,
            ));
            Ok(NetworkResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: b"{}".to_vec(),
            })
        }

        async fn send_post_request(
            &self,
            url: &str,
            options: NetworkRequestOptions,
        ) -> Result<NetworkResponse, NetworkError> {
            self.seen.lock().unwrap().push((
                "POST".to_string(),
                url.to_string(),
                options.headers,
                options.body,
            ));
            Ok(NetworkResponse {
                status: 201,
                headers: HeaderMap::new(),
                body: b"ok".to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn test_post_is_routed_with_extra_headers() {
        let network = Arc::new(RecordingNetwork::default());
        let client = OAuthHttpClient::new(network.clone()).with_header("client-request-id", "corr-9");

        let request = oauth2::http::Request::builder()
            .method("POST")
            .uri("https://login.example.com/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(b"grant_type=refresh_token".to_vec())
            .unwrap();

        let response = client.call(request).await.unwrap();
        assert_eq!(response.status().as_u16(), 201);
        assert_eq!(response.body(), b"ok");

        let seen = network.seen.lock().unwrap();
        let (verb, url, headers, body) = &seen[0];
        assert_eq!(verb, "POST");
        assert_eq!(url, "https://login.example.com/token");
        assert_eq!(headers.get("client-request-id").unwrap(), "corr-9");
        assert!(headers.get("content-type").is_some());
        assert_eq!(body.as_deref(), Some(&b"grant_type=refresh_token"[..]));
    }

    #[tokio::test]
    async fn test_unsupported_method_is_rejected() {
        let client = OAuthHttpClient::new(Arc::new(RecordingNetwork::default()));
        let request = oauth2::http::Request::builder()
            .method("DELETE")
            .uri("https://login.example.com/token")
            .body(Vec::new())
            .unwrap();

        let err = client.call(request).await.unwrap_err();
        assert!(matches!(err, NetworkError::UnsupportedMethod(_)));
    }

    #[test]
    fn test_invalid_header_is_skipped() {
        let client = OAuthHttpClient::new(Arc::new(RecordingNetwork::default()))
            .with_header("bad header", "value");
        assert!(client.headers().is_empty());
    }
}
