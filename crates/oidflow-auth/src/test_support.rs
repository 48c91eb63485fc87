//! Network doubles shared by unit tests

use std::collections::HashMap;

use async_trait::async_trait;
use http::HeaderMap;
use parking_lot::Mutex;

use crate::network::{NetworkError, NetworkModule, NetworkRequestOptions, NetworkResponse};

/// Fails the test if any request is made
#[derive(Debug, Default)]
pub(crate) struct PanicNetwork;

#[async_trait]
impl NetworkModule for PanicNetwork {
    async fn send_get_request(
        &self,
        url: &str,
        _options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError> {
        panic!("unexpected GET {url}");
    }

    async fn send_post_request(
        &self,
        url: &str,
        _options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError> {
        panic!("unexpected POST {url}");
    }
}

/// Serves canned JSON bodies by URL and records every request
#[derive(Debug, Default)]
pub(crate) struct StaticNetwork {
    routes: HashMap<String, (u16, String)>,
    calls: Mutex<Vec<RecordedCall>>,
}

/// A request seen by [`StaticNetwork`]
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub(crate) url: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<String>,
}

impl RecordedCall {
    /// Value of a form field in the body
    pub(crate) fn form_field(&self, name: &str) -> Option<String> {
        let body = self.body.as_deref()?;
        url::form_urlencoded::parse(body.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Header value as a string
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl StaticNetwork {
    pub(crate) fn with(mut self, url: &str, status: u16, body: serde_json::Value) -> Self {
        self.routes.insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Requests made to `url`, oldest first
    pub(crate) fn calls_to(&self, url: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.url == url)
            .cloned()
            .collect()
    }

    fn respond(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<NetworkResponse, NetworkError> {
        self.calls.lock().push(RecordedCall {
            url: url.to_string(),
            headers,
            body: body.map(|b| String::from_utf8_lossy(&b).into_owned()),
        });
        match self.routes.get(url) {
            Some((status, body)) => Ok(NetworkResponse {
                status: *status,
                headers: HeaderMap::new(),
                body: body.clone().into_bytes(),
            }),
            None => Err(NetworkError::Request(format!("no route for {url}"))),
        }
    }
}

#[async_trait]
impl NetworkModule for StaticNetwork {
    async fn send_get_request(
        &self,
        url: &str,
        options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError> {
        self.respond(url, options.headers, None)
    }

    async fn send_post_request(
        &self,
        url: &str,
        options: NetworkRequestOptions,
    ) -> Result<NetworkResponse, NetworkError> {
        self.respond(url, options.headers, options.body)
    }
}
