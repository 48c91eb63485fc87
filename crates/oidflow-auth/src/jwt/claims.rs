//! OIDC claim checks on an already verified payload
//!
//! Each rule runs only when its claim is present:
//!
//! - `nonce`: an expected nonce must be configured and equal the claim
//! - `c_hash`: checked against the authorization code
//! - `at_hash`: checked against the access token
//!
//! When the code or access token was not supplied, the `c_hash` / `at_hash`
//! check is skipped with a warning instead of failing. Callers that receive
//! tokens from the hybrid flow must pass the code and access token, otherwise
//! the token is not bound to them.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::hash::HashChecker;
use super::params::ValidationParameters;
use crate::error::{AuthError, ClaimsError, ConfigurationError};

/// Runs the nonce, `c_hash` and `at_hash` rules
#[derive(Debug, Clone, Default)]
pub struct ClaimsValidator {
    hash_checker: HashChecker,
}

impl ClaimsValidator {
    /// Validator using `hash_checker`
    pub fn new(hash_checker: HashChecker) -> Self {
        Self { hash_checker }
    }

    /// Check `payload` against `params`
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::MissingNonce`] when the token has a nonce but
    ///   none is expected
    /// - [`ClaimsError`] on a nonce, `c_hash` or `at_hash` mismatch
    pub fn validate_claims(
        &self,
        payload: &Map<String, Value>,
        params: &ValidationParameters,
    ) -> Result<(), AuthError> {
        if let Some(nonce) = payload.get("nonce") {
            let expected = params.nonce().ok_or(ConfigurationError::MissingNonce)?;
            if nonce.as_str() != Some(expected) {
                warn!("Token nonce does not match the expected nonce");
                return Err(ClaimsError::InvalidNonce.into());
            }
        }

        if let Some(c_hash) = payload.get("c_hash").and_then(Value::as_str) {
            match params.code() {
                Some(code) if !self.hash_checker.check_hash(code, c_hash) => {
                    warn!("c_hash does not match the authorization code");
                    return Err(ClaimsError::InvalidCHash.into());
                }
                Some(_) => debug!("c_hash validated"),
                None => warn!("Token has c_hash but no code was supplied; skipping c_hash check"),
            }
        }

        if let Some(at_hash) = payload.get("at_hash").and_then(Value::as_str) {
            match params.access_token_for_at_hash() {
                Some(token) if !self.hash_checker.check_hash(token, at_hash) => {
                    warn!("at_hash does not match the access token");
                    return Err(ClaimsError::InvalidAtHash.into());
                }
                Some(_) => debug!("at_hash validated"),
                None => warn!(
                    "Token has at_hash but no access token was supplied; skipping at_hash check"
                ),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::params::ValidationConfig;

    const CODE: &str = "Qcb0Orv1zh30vL1MPRsbm-diHiMwcLyZvn1arpZv-Jxf_11jnpEX3Tgfvk";
    const ACCESS_TOKEN: &str = "jHkWEdUXMU1BwAsC4vtUsZwnNGZ6Zb3T";

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn params(config: ValidationConfig) -> ValidationParameters {
        ValidationParameters::from_config(&config).unwrap()
    }

    fn base() -> ValidationConfig {
        ValidationConfig::new(["https://issuer.example.com/"], ["api://x"])
    }

    #[test]
    fn test_absent_claims_pass() {
        let validator = ClaimsValidator::default();
        assert!(validator
            .validate_claims(&payload(serde_json::json!({"sub": "s"})), &params(base()))
            .is_ok());
    }

    #[test]
    fn test_nonce_rules() {
        let validator = ClaimsValidator::default();
        let token = payload(serde_json::json!({"nonce": "n-1"}));

        let err = validator.validate_claims(&token, &params(base())).unwrap_err();
        assert!(matches!(
            err,
            AuthError::Configuration(ConfigurationError::MissingNonce)
        ));

        let err = validator
            .validate_claims(&token, &params(base().with_nonce("n-2")))
            .unwrap_err();
        assert!(matches!(err, AuthError::Claims(ClaimsError::InvalidNonce)));

        assert!(validator
            .validate_claims(&token, &params(base().with_nonce("n-1")))
            .is_ok());
    }

    #[test]
    fn test_c_hash_lenient_skip_and_mismatch() {
        let validator = ClaimsValidator::default();
        let token = payload(serde_json::json!({"c_hash": "LDktKdoQak3Pk0cnXxCltA"}));

        assert!(validator.validate_claims(&token, &params(base())).is_ok());
        assert!(validator
            .validate_claims(&token, &params(base().with_code(CODE)))
            .is_ok());

        let err = validator
            .validate_claims(&token, &params(base().with_code("another-code")))
            .unwrap_err();
        assert!(matches!(err, AuthError::Claims(ClaimsError::InvalidCHash)));
    }

    #[test]
    fn test_at_hash_lenient_skip_and_mismatch() {
        let validator = ClaimsValidator::default();
        let token = payload(serde_json::json!({"at_hash": "ZjE-HpaWow_AtWOSXgPB0w"}));

        assert!(validator.validate_claims(&token, &params(base())).is_ok());
        assert!(validator
            .validate_claims(&token, &params(base().with_access_token(ACCESS_TOKEN)))
            .is_ok());

        let err = validator
            .validate_claims(&token, &params(base().with_access_token("other")))
            .unwrap_err();
        assert!(matches!(err, AuthError::Claims(ClaimsError::InvalidAtHash)));
    }

    #[test]
    fn test_non_string_hash_claims_are_ignored() {
        let validator = ClaimsValidator::default();
        let token = payload(serde_json::json!({"c_hash": 12, "at_hash": null}));
        assert!(validator
            .validate_claims(&token, &params(base().with_code("x").with_access_token("y")))
            .is_ok());
    }
}
