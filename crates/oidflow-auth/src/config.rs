//! Client configuration
//!
//! Option structs are plain serde types so hosts can load them from any
//! format. Runtime collaborators (network module, crypto provider, token cache)
//! are not part of this data; they are injected through
//! [`ClientApplication::builder`](crate::application::ClientApplication::builder).

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Discovery and request shape expected by the identity provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// Plain OpenID Connect provider
    #[default]
    Oidc,
    /// Azure AD style provider (`v2.0` metadata path, `client_info` requested)
    Aad,
}

/// Application registration options
#[derive(Debug, Clone, Deserialize)]
pub struct AuthOptions {
    /// Client (application) id
    pub client_id: String,
    /// Default authority; individual requests may override it
    pub authority: String,
    /// Client secret for confidential clients
    #[serde(default, deserialize_with = "deserialize_optional_secret")]
    pub client_secret: Option<SecretString>,
    /// Redirect URI registered for the authorization code flow
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Pre-fetched OpenID configuration JSON; skips discovery when set
    #[serde(default)]
    pub authority_metadata: Option<String>,
    /// Capabilities advertised through the `xms_cc` claim (e.g. `cp1`)
    #[serde(default)]
    pub client_capabilities: Vec<String>,
    /// Validate id tokens received from the token endpoint
    #[serde(default)]
    pub validate_id_tokens: bool,
    /// Provider flavour
    #[serde(default)]
    pub protocol_mode: ProtocolMode,
}

// Custom deserialization for an optional SecretString
fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(s.map(SecretString::new))
}

/// Runtime tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemOptions {
    /// Cached access tokens expiring within this window are refreshed
    #[serde(default = "default_token_renewal_offset")]
    pub token_renewal_offset_seconds: u64,
    /// Timeout for the default network module
    #[serde(default = "default_network_timeout")]
    pub network_timeout_seconds: u64,
    /// How long a fetched JWKS is trusted before refetching
    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_seconds: u64,
}

fn default_token_renewal_offset() -> u64 {
    300
}

fn default_network_timeout() -> u64 {
    30
}

fn default_jwks_cache_ttl() -> u64 {
    600
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            token_renewal_offset_seconds: default_token_renewal_offset(),
            network_timeout_seconds: default_network_timeout(),
            jwks_cache_ttl_seconds: default_jwks_cache_ttl(),
        }
    }
}

impl SystemOptions {
    /// Network timeout as a [`Duration`]
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_seconds)
    }

    /// JWKS cache TTL as a [`Duration`]
    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_seconds)
    }
}

/// Logging options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggerOptions {
    /// Include usernames and account ids in log events
    #[serde(default)]
    pub pii_logging_enabled: bool,
}

impl LoggerOptions {
    /// `value` when PII logging is on, a placeholder otherwise
    pub fn pii<'a>(&self, value: &'a str) -> &'a str {
        if self.pii_logging_enabled {
            value
        } else {
            "[REDACTED]"
        }
    }
}

/// Complete client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Registration options
    pub auth: AuthOptions,
    /// Runtime tuning
    #[serde(default)]
    pub system: SystemOptions,
    /// Logging options
    #[serde(default)]
    pub logger: LoggerOptions,
}

impl Configuration {
    /// Public client configuration with defaults for everything else
    pub fn new(client_id: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            auth: AuthOptions {
                client_id: client_id.into(),
                authority: authority.into(),
                client_secret: None,
                redirect_uri: None,
                authority_metadata: None,
                client_capabilities: Vec::new(),
                validate_id_tokens: false,
                protocol_mode: ProtocolMode::default(),
            },
            system: SystemOptions::default(),
            logger: LoggerOptions::default(),
        }
    }

    /// Set the client secret
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.auth.client_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Set the redirect URI
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.auth.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Supply authority metadata instead of discovering it
    pub fn with_authority_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.auth.authority_metadata = Some(metadata.into());
        self
    }

    /// Set the protocol mode
    pub fn with_protocol_mode(mut self, mode: ProtocolMode) -> Self {
        self.auth.protocol_mode = mode;
        self
    }

    /// Validate id tokens on every token response
    pub fn with_id_token_validation(mut self, enabled: bool) -> Self {
        self.auth.validate_id_tokens = enabled;
        self
    }

    /// Advertise client capabilities
    pub fn with_client_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.auth.client_capabilities = capabilities;
        self
    }

    /// Check the options that do not depend on a request
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRequest`] for an empty client id and
    /// [`ConfigurationError::InvalidUrl`] for an unparseable redirect URI.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.auth.client_id.trim().is_empty() {
            return Err(ConfigurationError::InvalidRequest(
                "client_id must not be empty".to_string(),
            ));
        }
        if let Some(redirect_uri) = &self.auth.redirect_uri {
            url::Url::parse(redirect_uri).map_err(|e| ConfigurationError::InvalidUrl {
                field: "redirect_uri",
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Configuration = serde_json::from_value(serde_json::json!({
            "auth": {
                "client_id": "app-1",
                "authority": "https://login.example.com/tenant/",
                "client_secret": "s3cret",
                "protocol_mode": "aad"
            }
        }))
        .unwrap();

        assert_eq!(config.auth.protocol_mode, ProtocolMode::Aad);
        assert_eq!(
            config.auth.client_secret.as_ref().unwrap().expose_secret(),
            "s3cret"
        );
        assert_eq!(config.system.token_renewal_offset_seconds, 300);
        assert_eq!(config.system.jwks_cache_ttl(), Duration::from_secs(600));
        assert!(!config.logger.pii_logging_enabled);
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn test_pii_redaction() {
        let mut logger = LoggerOptions::default();
        assert_eq!(logger.pii("alice@example.com"), "[REDACTED]");
        logger.pii_logging_enabled = true;
        assert_eq!(logger.pii("alice@example.com"), "alice@example.com");
    }

    #[test]
    fn test_validate() {
        assert!(Configuration::new("app", "https://login.example.com/").validate().is_ok());
        assert!(matches!(
            Configuration::new(" ", "https://login.example.com/").validate(),
            Err(ConfigurationError::InvalidRequest(_))
        ));
        assert!(matches!(
            Configuration::new("app", "https://login.example.com/")
                .with_redirect_uri("not a url")
                .validate(),
            Err(ConfigurationError::InvalidUrl { field: "redirect_uri", .. })
        ));
    }
}
