//! Accounts and client info
//!
//! The `client_info` value returned by Azure AD style providers is a base64url
//! JSON object `{"uid": ..., "utid": ...}`; the pair forms the home account id
//! `uid.utid` used as the cache key. Plain OIDC providers fall back to `sub`.

use serde::{Deserialize, Serialize};

use crate::crypto::CryptoProvider;
use crate::error::AcquisitionErrorKind;

/// Identity tuple decoded from the `client_info` response field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Object id of the user in its home tenant
    pub uid: String,
    /// Home tenant id
    pub utid: String,
}

impl ClientInfo {
    /// Decode a raw `client_info` string
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionErrorKind::MalformedResponse`] if the value is not
    /// base64url JSON with `uid` and `utid`.
    pub fn decode(raw: &str, crypto: &dyn CryptoProvider) -> Result<Self, AcquisitionErrorKind> {
        let bytes = crypto.base64_url_decode(raw).ok_or_else(|| {
            AcquisitionErrorKind::MalformedResponse("client_info is not base64url".to_string())
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AcquisitionErrorKind::MalformedResponse(format!("client_info: {e}")))
    }

    /// Home account id (`uid.utid`)
    pub fn home_account_id(&self) -> String {
        format!("{}.{}", self.uid, self.utid)
    }
}

/// Claims of an id token, decoded without verification
///
/// Only used to shape [`AccountInfo`]; verification, when enabled, happens in
/// [`TokenValidator`](crate::jwt::TokenValidator).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Object id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    /// Tenant id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    /// Preferred username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// User principal name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upn: Option<String>,
    /// Email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nonce echoed from the authorization request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Expiry (seconds since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Remaining claims
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a compact id token
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionErrorKind::MalformedResponse`] if the token is not a
    /// three-segment JWT with a JSON payload.
    pub fn decode_unverified(
        id_token: &str,
        crypto: &dyn CryptoProvider,
    ) -> Result<Self, AcquisitionErrorKind> {
        let mut segments = id_token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => {
                return Err(AcquisitionErrorKind::MalformedResponse(
                    "id_token is not a compact JWT".to_string(),
                ));
            }
        };
        let bytes = crypto.base64_url_decode(payload).ok_or_else(|| {
            AcquisitionErrorKind::MalformedResponse("id_token payload is not base64url".to_string())
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AcquisitionErrorKind::MalformedResponse(format!("id_token payload: {e}")))
    }
}

/// A signed-in account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Cache key of the account (`uid.utid`, or `sub` for plain OIDC)
    pub home_account_id: String,
    /// Host of the authority that issued the tokens
    pub environment: String,
    /// Tenant the tokens were issued in
    pub tenant_id: String,
    /// Username, when the provider supplied one
    pub username: String,
    /// Account id local to the tenant
    pub local_account_id: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Claims of the most recent id token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_claims: Option<IdTokenClaims>,
}

impl AccountInfo {
    /// Build an account from a token response
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionErrorKind::MalformedResponse`] when neither
    /// `client_info` nor a `sub` claim identifies the account.
    pub fn from_response(
        environment: &str,
        client_info: Option<&ClientInfo>,
        claims: Option<&IdTokenClaims>,
    ) -> Result<Self, AcquisitionErrorKind> {
        let home_account_id = match (client_info, claims.and_then(|c| c.sub.as_deref())) {
            (Some(info), _) => info.home_account_id(),
            (None, Some(sub)) => sub.to_string(),
            (None, None) => {
                return Err(AcquisitionErrorKind::MalformedResponse(
                    "response identifies no account (no client_info and no sub claim)".to_string(),
                ));
            }
        };

        let tenant_id = claims
            .and_then(|c| c.tid.clone())
            .or_else(|| client_info.map(|i| i.utid.clone()))
            .unwrap_or_default();
        let username = claims
            .and_then(|c| {
                c.preferred_username
                    .clone()
                    .or_else(|| c.upn.clone())
                    .or_else(|| c.email.clone())
            })
            .unwrap_or_default();
        let local_account_id = claims
            .and_then(|c| c.oid.clone().or_else(|| c.sub.clone()))
            .or_else(|| client_info.map(|i| i.uid.clone()))
            .unwrap_or_default();

        Ok(Self {
            home_account_id,
            environment: environment.to_string(),
            tenant_id,
            username,
            local_account_id,
            name: claims.and_then(|c| c.name.clone()),
            id_token_claims: claims.cloned(),
        })
    }
}
