//! # Authority resolution
//!
//! An authority is the base URL of an identity provider tenant, e.g.
//! `https://login.example.com/contoso/`. Resolving it yields the provider's
//! OpenID configuration, either from caller-supplied metadata or by fetching
//! the discovery document:
//!
//! | Mode | Discovery URL |
//! |---|---|
//! | [`ProtocolMode::Oidc`] | `{authority}.well-known/openid-configuration` |
//! | [`ProtocolMode::Aad`] | `{authority}v2.0/.well-known/openid-configuration` |
//!
//! Multi-tenant providers publish endpoints containing a `{tenant}`
//! placeholder; it is replaced with the authority's tenant segment.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::ProtocolMode;
use crate::error::{ConfigurationError, ResolutionError};
use crate::network::{NetworkModule, NetworkRequestOptions, is_allowed_endpoint};

const TENANT_PLACEHOLDER: &str = "{tenant}";

/// OpenID Provider configuration (OIDC Discovery 1.0 §3)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    /// Issuer identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Authorization endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    /// Token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    /// Device authorization endpoint (RFC 8628)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_authorization_endpoint: Option<String>,
    /// JWKS URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    /// End session endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    /// Remaining metadata
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

impl OpenIdConfiguration {
    fn replace_tenant(&mut self, tenant: &str) {
        for field in [
            &mut self.issuer,
            &mut self.authorization_endpoint,
            &mut self.token_endpoint,
            &mut self.device_authorization_endpoint,
            &mut self.jwks_uri,
            &mut self.end_session_endpoint,
        ]
        .into_iter()
        .flatten()
        {
            if field.contains(TENANT_PLACEHOLDER) {
                *field = field.replace(TENANT_PLACEHOLDER, tenant);
            }
        }
    }
}

/// Fetch and parse an OpenID configuration document
pub(crate) async fn fetch_openid_configuration(
    network: &dyn NetworkModule,
    url: &str,
) -> Result<OpenIdConfiguration, ResolutionError> {
    if !is_allowed_endpoint(url) {
        return Err(ResolutionError::InsecureEndpoint(url.to_string()));
    }

    debug!(discovery_url = %url, "Fetching OpenID configuration");
    let response = network
        .send_get_request(url, NetworkRequestOptions::default())
        .await
        .map_err(|source| ResolutionError::Network {
            url: url.to_string(),
            source,
        })?;

    if !response.is_success() {
        return Err(ResolutionError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    response
        .json()
        .map_err(|e| ResolutionError::MalformedDiscovery {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

/// A normalised authority URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    url: Url,
    protocol_mode: ProtocolMode,
}

impl Authority {
    /// Parse and normalise an authority
    ///
    /// The result always ends with `/`, has no query or fragment, and uses
    /// https (http is accepted for loopback hosts only).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidAuthority`] if the URL does not meet
    /// those rules.
    pub fn parse(authority: &str, protocol_mode: ProtocolMode) -> Result<Self, ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidAuthority {
            authority: authority.to_string(),
            reason: reason.to_string(),
        };

        let mut url = Url::parse(authority.trim()).map_err(|e| invalid(&e.to_string()))?;
        if !is_allowed_endpoint(url.as_str()) {
            return Err(invalid("authority must use https"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("authority must not contain a query or fragment"));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self { url, protocol_mode })
    }

    /// Normalised authority string (with trailing slash)
    pub fn canonical(&self) -> &str {
        self.url.as_str()
    }

    /// Host of the authority, used as the account environment
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// First path segment, if any (tenant for multi-tenant providers)
    pub fn tenant(&self) -> Option<&str> {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
    }

    /// Protocol mode the authority was parsed with
    pub fn protocol_mode(&self) -> ProtocolMode {
        self.protocol_mode
    }

    /// Discovery document URL
    pub fn discovery_url(&self) -> String {
        match self.protocol_mode {
            ProtocolMode::Oidc => format!("{}.well-known/openid-configuration", self.canonical()),
            ProtocolMode::Aad => format!("{}v2.0/.well-known/openid-configuration", self.canonical()),
        }
    }

    /// Resolve the authority's metadata
    ///
    /// With `metadata_override` set the network is not used.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] if the document cannot be fetched or parsed.
    pub async fn resolve(
        &self,
        network: &dyn NetworkModule,
        metadata_override: Option<&str>,
    ) -> Result<AuthorityMetadata, ResolutionError> {
        let mut configuration = match metadata_override {
            Some(raw) => {
                debug!(authority = %self.canonical(), "Using supplied authority metadata");
                serde_json::from_str(raw).map_err(|e| ResolutionError::MalformedDiscovery {
                    url: "authority_metadata".to_string(),
                    reason: e.to_string(),
                })?
            }
            None => fetch_openid_configuration(network, &self.discovery_url()).await?,
        };

        if let Some(tenant) = self.tenant() {
            configuration.replace_tenant(tenant);
        }

        Ok(AuthorityMetadata {
            authority: self.clone(),
            configuration,
        })
    }
}

/// A resolved authority
#[derive(Debug, Clone)]
pub struct AuthorityMetadata {
    authority: Authority,
    configuration: OpenIdConfiguration,
}

impl AuthorityMetadata {
    /// The authority this metadata was resolved for
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Raw configuration document (tenant placeholders replaced)
    pub fn configuration(&self) -> &OpenIdConfiguration {
        &self.configuration
    }

    /// Issuer, falling back to the authority itself
    pub fn issuer(&self) -> &str {
        self.configuration
            .issuer
            .as_deref()
            .unwrap_or_else(|| self.authority.canonical())
    }

    /// Token endpoint
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingEndpoint`] if the document has none.
    pub fn token_endpoint(&self) -> Result<&str, ConfigurationError> {
        self.configuration
            .token_endpoint
            .as_deref()
            .ok_or(ConfigurationError::MissingEndpoint("token_endpoint"))
    }

    /// Authorization endpoint
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingEndpoint`] if the document has none.
    pub fn authorization_endpoint(&self) -> Result<&str, ConfigurationError> {
        self.configuration
            .authorization_endpoint
            .as_deref()
            .ok_or(ConfigurationError::MissingEndpoint("authorization_endpoint"))
    }

    /// Device authorization endpoint
    ///
    /// Falls back to `{authority}oauth2/v2.0/devicecode` for Azure AD style
    /// providers, which do not always advertise it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingEndpoint`] for OIDC providers that
    /// do not advertise one.
    pub fn device_authorization_endpoint(&self) -> Result<String, ConfigurationError> {
        match (
            &self.configuration.device_authorization_endpoint,
            self.authority.protocol_mode,
        ) {
            (Some(endpoint), _) => Ok(endpoint.clone()),
            (None, ProtocolMode::Aad) => {
                Ok(format!("{}oauth2/v2.0/devicecode", self.authority.canonical()))
            }
            (None, ProtocolMode::Oidc) => Err(ConfigurationError::MissingEndpoint(
                "device_authorization_endpoint",
            )),
        }
    }

    /// JWKS URI, if advertised
    pub fn jwks_uri(&self) -> Option<&str> {
        self.configuration.jwks_uri.as_deref()
    }
}
