//! JWKS (JSON Web Key Set) fetching and caching
//!
//! - **TTL-based caching**: default 10 minutes
//! - **Refresh on unknown `kid`**: a cached set that lacks the requested key
//!   is refetched once, rate limited, to pick up key rotation
//! - **Concurrent refresh**: fetches are idempotent and the last writer wins
//!
//! HTTPS is required for JWKS endpoints; http is accepted for loopback hosts
//! only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use jsonwebtoken::jwk::JwkSet;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::ResolutionError;
use crate::network::{NetworkModule, NetworkRequestOptions, is_allowed_endpoint};

/// Default cache TTL
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(600);

/// JWKS cache entry with metadata
#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    cached_at: SystemTime,
    ttl: Duration,
}

impl CachedJwks {
    fn is_valid(&self) -> bool {
        match SystemTime::now().duration_since(self.cached_at) {
            Ok(age) => age < self.ttl,
            // Clock went backwards
            Err(_) => false,
        }
    }
}

/// Fetches and caches one JWKS endpoint
#[derive(Debug, Clone)]
pub struct JwksClient {
    jwks_uri: String,
    network: Arc<dyn NetworkModule>,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    cache_ttl: Duration,
    /// Minimum interval between forced refreshes
    min_refresh_interval: Duration,
    last_refresh: Arc<RwLock<Option<SystemTime>>>,
}

impl JwksClient {
    /// Client with the default 10 minute TTL
    pub fn new(jwks_uri: impl Into<String>, network: Arc<dyn NetworkModule>) -> Self {
        Self::with_ttl(jwks_uri, network, DEFAULT_JWKS_TTL)
    }

    /// Client with a custom TTL
    pub fn with_ttl(
        jwks_uri: impl Into<String>,
        network: Arc<dyn NetworkModule>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            network,
            cache: Arc::new(RwLock::new(None)),
            cache_ttl,
            min_refresh_interval: Duration::from_secs(5),
            last_refresh: Arc::new(RwLock::new(None)),
        }
    }

    /// JWKS endpoint URI
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Get the key set, from cache when still valid
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] if the endpoint is insecure, unreachable,
    /// answers with a non-success status or serves an invalid document.
    pub async fn get_jwks(&self) -> Result<JwkSet, ResolutionError> {
        if let Some(jwks) = self.cached().await {
            debug!(jwks_uri = %self.jwks_uri, "Using cached JWKS");
            return Ok(jwks);
        }
        self.fetch_and_cache().await
    }

    /// Get the key set, refetching a cached one that does not contain `kid`
    ///
    /// # Errors
    ///
    /// Same as [`get_jwks`](Self::get_jwks).
    pub async fn get_jwks_for_kid(&self, kid: Option<&str>) -> Result<JwkSet, ResolutionError> {
        let Some(cached) = self.cached().await else {
            return self.fetch_and_cache().await;
        };

        match kid {
            Some(kid) if cached.find(kid).is_none() => {
                debug!(jwks_uri = %self.jwks_uri, kid, "Key id not in cached JWKS, refreshing");
                self.refresh().await
            }
            _ => Ok(cached),
        }
    }

    /// Force a refetch, rate limited to one per `min_refresh_interval`
    ///
    /// # Errors
    ///
    /// Same as [`get_jwks`](Self::get_jwks).
    pub async fn refresh(&self) -> Result<JwkSet, ResolutionError> {
        {
            let last_refresh = self.last_refresh.read().await;
            if let Some(last) = *last_refresh
                && let Ok(since_last) = SystemTime::now().duration_since(last)
                && since_last < self.min_refresh_interval
            {
                warn!(
                    jwks_uri = %self.jwks_uri,
                    since_last_ms = since_last.as_millis(),
                    "JWKS refresh rate limited, using cache"
                );
                return self.get_jwks().await;
            }
        }

        self.fetch_and_cache().await
    }

    /// Drop the cached set
    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
        debug!(jwks_uri = %self.jwks_uri, "JWKS cache cleared");
    }

    async fn cached(&self) -> Option<JwkSet> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|cached| cached.is_valid())
            .map(|cached| cached.jwks.clone())
    }

    async fn fetch_and_cache(&self) -> Result<JwkSet, ResolutionError> {
        info!(jwks_uri = %self.jwks_uri, "Fetching JWKS from endpoint");

        if !is_allowed_endpoint(&self.jwks_uri) {
            return Err(ResolutionError::InsecureEndpoint(self.jwks_uri.clone()));
        }

        let response = self
            .network
            .send_get_request(&self.jwks_uri, NetworkRequestOptions::default())
            .await
            .map_err(|source| {
                error!(jwks_uri = %self.jwks_uri, error = %source, "Failed to fetch JWKS");
                ResolutionError::Network {
                    url: self.jwks_uri.clone(),
                    source,
                }
            })?;

        if !response.is_success() {
            error!(
                jwks_uri = %self.jwks_uri,
                status = response.status,
                "JWKS endpoint returned error status"
            );
            return Err(ResolutionError::HttpStatus {
                url: self.jwks_uri.clone(),
                status: response.status,
            });
        }

        let jwks: JwkSet = response.json().map_err(|e| {
            error!(jwks_uri = %self.jwks_uri, error = %e, "Failed to parse JWKS JSON");
            ResolutionError::MalformedJwks {
                url: self.jwks_uri.clone(),
                reason: e.to_string(),
            }
        })?;

        info!(
            jwks_uri = %self.jwks_uri,
            key_count = jwks.keys.len(),
            "Successfully fetched JWKS"
        );

        let now = SystemTime::now();
        *self.cache.write().await = Some(CachedJwks {
            jwks: jwks.clone(),
            cached_at: now,
            ttl: self.cache_ttl,
        });
        *self.last_refresh.write().await = Some(now);

        Ok(jwks)
    }
}

/// Shared registry of [`JwksClient`]s, one per JWKS URI
#[derive(Debug)]
pub struct JwksCache {
    network: Arc<dyn NetworkModule>,
    ttl: Duration,
    clients: RwLock<HashMap<String, Arc<JwksClient>>>,
}

impl JwksCache {
    /// Registry using `network` and the default TTL
    pub fn new(network: Arc<dyn NetworkModule>) -> Self {
        Self::with_ttl(network, DEFAULT_JWKS_TTL)
    }

    /// Registry with a custom TTL for every client it creates
    pub fn with_ttl(network: Arc<dyn NetworkModule>, ttl: Duration) -> Self {
        Self {
            network,
            ttl,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Network module shared with the clients
    pub fn network(&self) -> &Arc<dyn NetworkModule> {
        &self.network
    }

    /// Get or create the client for `jwks_uri`
    pub async fn client(&self, jwks_uri: &str) -> Arc<JwksClient> {
        if let Some(client) = self.clients.read().await.get(jwks_uri) {
            return Arc::clone(client);
        }

        let mut clients = self.clients.write().await;
        Arc::clone(clients.entry(jwks_uri.to_string()).or_insert_with(|| {
            Arc::new(JwksClient::with_ttl(
                jwks_uri,
                Arc::clone(&self.network),
                self.ttl,
            ))
        }))
    }

    /// Number of registered endpoints
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether no endpoint has been registered
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
