//! Token validation
//!
//! [`TokenValidator::validate_token`] runs, in order:
//!
//! 1. token and config pre-checks (no I/O)
//! 2. header decoding and the algorithm allow-list
//! 3. key resolution through the [`KeySourceResolver`]
//! 4. signature, `typ`, `iss`, `aud`, `sub`, `exp` and `nbf` checks
//! 5. the [`ClaimsValidator`] rules
//!
//! Verification is all or nothing; a failure at any step returns an error and
//! no part of the token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Header, Validation, decode, decode_header};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::claims::ClaimsValidator;
use super::jwks::JwksCache;
use super::keys::KeySourceResolver;
use super::params::{ValidationConfig, ValidationParameters};
use crate::error::{AuthError, ConfigurationError, Result, VerificationCheck};
use crate::network::NetworkModule;
use crate::telemetry::{record_token_validation, record_token_validation_duration};

/// Successfully validated token
#[derive(Debug, Clone)]
pub struct TokenValidationResult {
    /// Verified JOSE header
    pub protected_header: Header,
    /// Verified claim set
    pub payload: Map<String, Value>,
    /// The compact token exactly as supplied
    pub token: String,
    /// The token type that was enforced
    pub token_type: String,
}

/// Validates compact JWTs against a [`ValidationConfig`]
#[derive(Debug)]
pub struct TokenValidator {
    resolver: KeySourceResolver,
    claims: ClaimsValidator,
}

impl TokenValidator {
    /// Validator with the default key source order and a 10 minute JWKS cache
    pub fn new(network: Arc<dyn NetworkModule>) -> Self {
        let jwks = Arc::new(JwksCache::new(network));
        Self::with_resolver(
            KeySourceResolver::new(jwks, super::jwks::DEFAULT_JWKS_TTL),
            ClaimsValidator::default(),
        )
    }

    /// Validator sharing an existing JWKS cache
    pub fn with_jwks_cache(jwks: Arc<JwksCache>, discovery_ttl: Duration) -> Self {
        Self::with_resolver(
            KeySourceResolver::new(jwks, discovery_ttl),
            ClaimsValidator::default(),
        )
    }

    /// Validator with custom components
    pub fn with_resolver(resolver: KeySourceResolver, claims: ClaimsValidator) -> Self {
        Self { resolver, claims }
    }

    /// Validate `token` against `config`
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError`] for an empty token, empty issuer or audience
    ///   lists, or a nonce claim with no expected nonce
    /// - [`ResolutionError`](crate::error::ResolutionError) when keys cannot
    ///   be obtained
    /// - [`VerificationError`](crate::error::VerificationError) naming the
    ///   failed check
    /// - [`ClaimsError`](crate::error::ClaimsError) for nonce / hash mismatches
    pub async fn validate_token(
        &self,
        token: &str,
        config: &ValidationConfig,
    ) -> Result<TokenValidationResult> {
        let started = Instant::now();
        let result = self.validate_inner(token, config).await;
        record_token_validation(result.is_ok());
        record_token_validation_duration(started.elapsed().as_secs_f64());
        result
    }

    /// Extract a token from a raw request fragment and validate it
    ///
    /// `raw` is either an `Authorization` header value (`Bearer <token>`) or a
    /// form body carrying `access_token=` or `id_token=`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingToken`] when no token can be
    /// extracted, otherwise the errors of [`validate_token`](Self::validate_token).
    pub async fn validate_token_from_request(
        &self,
        raw: &str,
        config: &ValidationConfig,
    ) -> Result<TokenValidationResult> {
        let token = extract_token(raw).ok_or(ConfigurationError::MissingToken)?;
        self.validate_token(&token, config).await
    }

    async fn validate_inner(
        &self,
        token: &str,
        config: &ValidationConfig,
    ) -> Result<TokenValidationResult> {
        if token.trim().is_empty() {
            return Err(ConfigurationError::MissingToken.into());
        }
        let params = ValidationParameters::from_config(config)?;

        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            AuthError::verification(VerificationCheck::MalformedToken, e.to_string())
        })?;

        if !params.valid_algorithms().contains(&header.alg) {
            warn!(
                algorithm = ?header.alg,
                allowed = ?params.valid_algorithms(),
                "JWT algorithm not allowed"
            );
            return Err(AuthError::verification(
                VerificationCheck::Algorithm,
                format!("algorithm {:?} is not allowed", header.alg),
            ));
        }

        let expected_type = params.expected_type().to_string();
        if !type_matches(header.typ.as_deref(), &expected_type) {
            warn!(typ = ?header.typ, expected = %expected_type, "Unexpected token type");
            return Err(AuthError::verification(
                VerificationCheck::Type,
                format!("expected typ {expected_type}, got {:?}", header.typ),
            ));
        }

        let key_set = self
            .resolver
            .resolve_key_set(&params, header.kid.as_deref())
            .await?;
        let key = key_set.select(&header)?;

        let mut validation = Validation::new(header.alg);
        // `exp` and `nbf` are checked only when present
        validation.set_required_spec_claims(&["iss", "aud"]);
        validation.set_issuer(params.valid_issuers());
        validation.set_audience(params.valid_audiences());
        validation.sub = params.subject().map(str::to_string);
        validation.validate_nbf = true;
        validation.leeway = params.clock_skew().as_secs();

        let data = decode::<Map<String, Value>>(token, key, &validation).map_err(|e| {
            let check = verification_check(e.kind());
            warn!(check = %check, error = %e, "JWT verification failed");
            AuthError::verification(check, e.to_string())
        })?;

        self.claims.validate_claims(&data.claims, &params)?;

        debug!(
            key_source = ?key_set.source(),
            algorithm = ?data.header.alg,
            "JWT validation successful"
        );

        Ok(TokenValidationResult {
            protected_header: data.header,
            payload: data.claims,
            token: token.to_string(),
            token_type: expected_type,
        })
    }
}

/// Compare a `typ` header to the expected type
///
/// Case-insensitive, with an `application/` media type prefix ignored on
/// either side. A missing header never matches.
fn type_matches(actual: Option<&str>, expected: &str) -> bool {
    fn normalize(value: &str) -> String {
        let lower = value.trim().to_ascii_lowercase();
        lower
            .strip_prefix("application/")
            .map(str::to_string)
            .unwrap_or(lower)
    }
    actual.is_some_and(|actual| normalize(actual) == normalize(expected))
}

fn verification_check(kind: &ErrorKind) -> VerificationCheck {
    match kind {
        ErrorKind::InvalidSignature => VerificationCheck::Signature,
        ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => VerificationCheck::Algorithm,
        ErrorKind::InvalidIssuer => VerificationCheck::Issuer,
        ErrorKind::InvalidAudience => VerificationCheck::Audience,
        ErrorKind::InvalidSubject => VerificationCheck::Subject,
        ErrorKind::ExpiredSignature => VerificationCheck::Expiry,
        ErrorKind::ImmatureSignature => VerificationCheck::NotBefore,
        ErrorKind::MissingRequiredClaim(_) => VerificationCheck::MissingClaim,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            VerificationCheck::MalformedToken
        }
        ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
            VerificationCheck::KeySelection
        }
        _ => VerificationCheck::Signature,
    }
}

/// Pull a token out of an `Authorization` header value or a form body
fn extract_token(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some((scheme, token)) = raw.split_once(' ')
        && scheme.eq_ignore_ascii_case("bearer")
    {
        let token = token.trim();
        return (!token.is_empty()).then(|| token.to_string());
    }

    if raw.contains('=') {
        let fields: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        return ["access_token", "id_token"].iter().find_map(|name| {
            fields
                .iter()
                .find(|(k, v)| k == name && !v.is_empty())
                .map(|(_, v)| v.clone())
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::params::SigningKey;
    use crate::test_support::PanicNetwork;
    use jsonwebtoken::{Algorithm, EncodingKey, encode};

    const SECRET: &[u8] = b"secret-key-material-for-tests";
    const ISSUER: &str = "https://issuer.example.com/";
    const AUDIENCE: &str = "api://test-client";

    fn oct_key() -> SigningKey {
        SigningKey::Jwk(
            serde_json::from_value(serde_json::json!({
                "kty": "oct",
                "kid": "k1",
                "k": "c2VjcmV0LWtleS1tYXRlcmlhbC1mb3ItdGVzdHM"
            }))
            .unwrap(),
        )
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn mint(claims: Value, typ: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("k1".to_string());
        header.typ = typ.map(str::to_string);
        encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn claims() -> Value {
        serde_json::json!({
            "iss": ISSUER,
            "aud": AUDIENCE,
            "sub": "user-1",
            "exp": now() + 600,
            "iat": now(),
        })
    }

    fn config() -> ValidationConfig {
        ValidationConfig::new([ISSUER], [AUDIENCE])
            .with_algorithms(vec![Algorithm::HS256])
            .with_signing_keys(vec![oct_key()])
    }

    fn validator() -> TokenValidator {
        TokenValidator::new(Arc::new(PanicNetwork))
    }

    #[tokio::test]
    async fn test_valid_token_is_echoed() {
        let token = mint(claims(), Some("JWT"));
        let result = validator().validate_token(&token, &config()).await.unwrap();

        assert_eq!(result.token, token);
        assert_eq!(result.token_type, "JWT");
        assert_eq!(result.payload["iss"], ISSUER);
        assert_eq!(result.protected_header.kid.as_deref(), Some("k1"));
    }

    #[tokio::test]
    async fn test_preconditions_fail_before_network() {
        let token = mint(claims(), Some("JWT"));
        let network_config = ValidationConfig::new(Vec::<String>::new(), [AUDIENCE])
            .with_jwks_uri("https://issuer.example.com/jwks");

        let err = validator().validate_token(&token, &network_config).await.unwrap_err();
        assert_eq!(err.error_code(), "empty_issuer");

        let err = validator()
            .validate_token(&token, &ValidationConfig::new([ISSUER], Vec::<String>::new()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "empty_audience");

        let err = validator().validate_token("  ", &config()).await.unwrap_err();
        assert_eq!(err.error_code(), "missing_token");
    }

    #[tokio::test]
    async fn test_claim_checks_name_the_failure() {
        let cases = [
            (serde_json::json!({"iss": "https://evil.example.com/"}), "invalid_issuer"),
            (serde_json::json!({"aud": "api://other"}), "invalid_audience"),
            (serde_json::json!({"exp": now() - 3600}), "token_expired"),
            (serde_json::json!({"nbf": now() + 3600}), "token_not_yet_valid"),
        ];

        for (overrides, code) in cases {
            let mut payload = claims();
            for (k, v) in overrides.as_object().unwrap() {
                payload[k] = v.clone();
            }
            let token = mint(payload, Some("JWT"));
            let err = validator().validate_token(&token, &config()).await.unwrap_err();
            assert_eq!(err.error_code(), code);
        }
    }

    #[tokio::test]
    async fn test_time_claims_are_checked_only_when_present() {
        let mut payload = claims();
        payload.as_object_mut().unwrap().remove("exp");
        let token = mint(payload, Some("JWT"));
        validator().validate_token(&token, &config()).await.unwrap();

        let mut payload = claims();
        payload.as_object_mut().unwrap().remove("iss");
        let token = mint(payload, Some("JWT"));
        let err = validator().validate_token(&token, &config()).await.unwrap_err();
        assert_eq!(err.error_code(), "missing_claim");
    }

    #[tokio::test]
    async fn test_subject_and_type_checks() {
        let token = mint(claims(), Some("JWT"));
        let err = validator()
            .validate_token(&token, &config().with_subject("user-2"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_subject");

        let at_jwt = mint(claims(), Some("at+jwt"));
        let err = validator().validate_token(&at_jwt, &config()).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_type");

        let result = validator()
            .validate_token(&at_jwt, &config().with_types(["application/at+jwt"]))
            .await
            .unwrap();
        assert_eq!(result.token_type, "application/at+jwt");

        let untyped = mint(claims(), None);
        let err = validator().validate_token(&untyped, &config()).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_type");
    }

    #[tokio::test]
    async fn test_algorithm_and_signature_checks() {
        let token = mint(claims(), Some("JWT"));
        let err = validator()
            .validate_token(&token, &config().with_algorithms(vec![Algorithm::RS256]))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_algorithm");

        let forged = encode(
            &{
                let mut header = Header::new(Algorithm::HS256);
                header.kid = Some("k1".to_string());
                header
            },
            &claims(),
            &EncodingKey::from_secret(b"another-secret"),
        )
        .unwrap();
        let err = validator().validate_token(&forged, &config()).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_signature");

        let err = validator().validate_token("not-a-jwt", &config()).await.unwrap_err();
        assert_eq!(err.error_code(), "malformed_token");
    }

    #[tokio::test]
    async fn test_nonce_is_required_when_present() {
        let mut payload = claims();
        payload["nonce"] = Value::from("n-1");
        let token = mint(payload, Some("JWT"));

        let err = validator().validate_token(&token, &config()).await.unwrap_err();
        assert_eq!(err.error_code(), "missing_nonce");

        assert!(validator()
            .validate_token(&token, &config().with_nonce("n-1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_validate_from_request() {
        let token = mint(claims(), Some("JWT"));

        let result = validator()
            .validate_token_from_request(&format!("Bearer {token}"), &config())
            .await
            .unwrap();
        assert_eq!(result.token, token);

        let body = format!("state=abc&id_token={token}");
        assert!(validator()
            .validate_token_from_request(&body, &config())
            .await
            .is_ok());

        let err = validator()
            .validate_token_from_request("Basic dXNlcjpwYXNz", &config())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "missing_token");
    }

    #[test]
    fn test_extract_token_prefers_access_token() {
        assert_eq!(
            extract_token("id_token=b&access_token=a").as_deref(),
            Some("a")
        );
        assert_eq!(extract_token("bearer   t ").as_deref(), Some("t"));
        assert_eq!(extract_token("Bearer "), None);
        assert_eq!(extract_token("code=x"), None);
    }

    #[test]
    fn test_type_normalization() {
        assert!(type_matches(Some("jwt"), "JWT"));
        assert!(type_matches(Some("application/jwt"), "JWT"));
        assert!(type_matches(Some("at+jwt"), "application/at+jwt"));
        assert!(!type_matches(None, "JWT"));
        assert!(!type_matches(Some("at+jwt"), "JWT"));
    }
}
