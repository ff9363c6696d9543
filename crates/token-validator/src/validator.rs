//! Token validation engine
//!
//! [`TokenValidator::validate`] runs a fixed sequence of checks and stops at the
//! first failure, whose [`TokenError`] variant is the reported reason:
//!
//! 1. decode the compact token (no network)
//! 2. issuer: present, a URL, HTTPS (HTTP only in development), equal to the configured issuer
//! 3. resolve the signing key by `kid`, refreshing the key set once on a miss
//! 4. verify the RS256/RS512 signature together with `exp`, `nbf`, `iss` and `aud`
//! 5. `aud` contains the configured audience
//! 6. `sub` is present
//! 7. a scope claim is present and grants any of the expected scopes
//! 8. now lies within `[iat, exp]`
//!
//! The only side effect is the key set invalidation in step 3.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};
use url::Url;

use crate::cache::CredentialCache;
use crate::claims::DecodedClaims;
use crate::config::{ConfigHandle, ValidatorConfig};
use crate::error::{TokenError, TokenResult};

/// Signature algorithms accepted in the token header
pub const ACCEPTED_ALGORITHMS: [Algorithm; 2] = [Algorithm::RS256, Algorithm::RS512];

/// Key set reads per validation: the cached set, then one fresh download
const MAX_KEY_RESOLUTION_ATTEMPTS: usize = 2;

/// Outcome handed back to request adapters
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Whether every check passed
    pub valid: bool,
    /// Unverified claims, present whenever the token could be decoded
    pub claims: Option<DecodedClaims>,
}

/// Bearer token validator
///
/// Cheap to clone; clones share the configuration and the credential cache.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use token_validator::{CredentialCache, TokenValidator, ValidatorConfig};
/// # tokio_test::block_on(async {
/// let mut config = ValidatorConfig::new();
/// config.configure([
///     ("issuer_url", "https://idp.example.com"),
///     ("audience", "https://api.example.com"),
/// ]);
///
/// let cache = Arc::new(CredentialCache::builder(config).app_name("billing").build()?);
/// let validator = TokenValidator::new(cache);
///
/// if validator.is_valid_access_token("eyJ0eXAi...", &["billing:read"]).await {
///     println!("welcome");
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TokenValidator {
    config: ConfigHandle,
    cache: Arc<CredentialCache>,
}

impl TokenValidator {
    /// Validator reading the same configuration as `cache`
    pub fn new(cache: Arc<CredentialCache>) -> Self {
        Self {
            config: cache.config_handle().clone(),
            cache,
        }
    }

    /// Shared credential cache
    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    /// Shared configuration handle
    pub fn config_handle(&self) -> &ConfigHandle {
        &self.config
    }

    /// Run every check and return the claims of a valid token
    ///
    /// An empty `expected_scopes` accepts any granted scopes, including none,
    /// as long as a scope claim is present.
    ///
    /// # Errors
    ///
    /// Returns the [`TokenError`] of the first failing check.
    pub async fn validate(&self, raw: &str, expected_scopes: &[&str]) -> TokenResult<DecodedClaims> {
        let config = self.config.config();

        let claims = DecodedClaims::decode(raw)?;
        check_issuer(&claims, &config)?;
        let key = self.resolve_key(&claims).await?;
        verify_signature(raw, &claims, &key, &config)?;
        check_audience(&claims, &config)?;
        check_subject(&claims)?;
        check_scopes(&claims, expected_scopes)?;
        check_lifetime(&claims, Utc::now().timestamp())?;

        debug!(
            subject = claims.sub().unwrap_or_default(),
            kid = claims.kid().unwrap_or_default(),
            "Access token validated"
        );
        Ok(claims)
    }

    /// `true` if the token passes every check; the rejection reason is logged
    pub async fn is_valid_access_token(&self, raw: &str, expected_scopes: &[&str]) -> bool {
        match self.validate(raw, expected_scopes).await {
            Ok(_) => true,
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Access token rejected");
                false
            }
        }
    }

    /// Validity plus the unverified claims, for request adapters
    pub async fn authenticate(&self, raw: &str, expected_scopes: &[&str]) -> Verdict {
        Verdict {
            valid: self.is_valid_access_token(raw, expected_scopes).await,
            claims: DecodedClaims::decode(raw).ok(),
        }
    }

    /// Decode without verifying anything
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Format`] for a malformed token.
    pub fn decoded_claims(&self, raw: &str) -> TokenResult<DecodedClaims> {
        DecodedClaims::decode(raw)
    }

    /// Reserved for refresh-token flows; does nothing
    pub async fn refresh(&self) {
        debug!("Token refresh is not supported");
    }

    /// Find the key for the token's `kid`, reloading the key set once on a miss
    async fn resolve_key(&self, claims: &DecodedClaims) -> TokenResult<DecodingKey> {
        let kid = claims
            .kid()
            .ok_or_else(|| TokenError::InvalidSignatureKey("token carries no kid".to_string()))?;

        for attempt in 1..=MAX_KEY_RESOLUTION_ATTEMPTS {
            let keys = self.cache.signing_key_set().await;
            if let Some(jwk) = keys.find(kid) {
                return DecodingKey::from_jwk(jwk).map_err(|e| {
                    TokenError::InvalidSignatureKey(format!("unusable key {kid}: {e}"))
                });
            }

            if attempt < MAX_KEY_RESOLUTION_ATTEMPTS {
                warn!(kid = kid, "Signing key not in key set, refreshing");
                self.cache.invalidate_signing_key_set().await;
            }
        }

        Err(TokenError::InvalidSignatureKey(format!(
            "no signing key with kid {kid}"
        )))
    }
}

fn check_issuer(claims: &DecodedClaims, config: &ValidatorConfig) -> TokenResult<()> {
    let iss = claims
        .iss()
        .filter(|iss| !iss.is_empty())
        .ok_or_else(|| TokenError::InvalidIssuer("missing iss claim".to_string()))?;

    let url = Url::parse(iss)
        .map_err(|e| TokenError::InvalidIssuer(format!("{iss} is not a URL: {e}")))?;
    match url.scheme() {
        "https" => {}
        "http" if config.deployment_mode.allows_plain_http() => {}
        scheme => {
            return Err(TokenError::InvalidIssuer(format!(
                "{scheme} issuer {iss} not allowed"
            )));
        }
    }

    if iss != config.issuer_url {
        return Err(TokenError::InvalidIssuer(format!(
            "expected {}, got {iss}",
            config.issuer_url
        )));
    }
    Ok(())
}

fn verify_signature(
    raw: &str,
    claims: &DecodedClaims,
    key: &DecodingKey,
    config: &ValidatorConfig,
) -> TokenResult<()> {
    let algorithm = match claims.alg() {
        Some("RS256") => Algorithm::RS256,
        Some("RS512") => Algorithm::RS512,
        other => {
            return Err(TokenError::InvalidSignature(format!(
                "algorithm {} not accepted",
                other.unwrap_or("none")
            )));
        }
    };

    let mut validation = Validation::new(algorithm);
    validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
    validation.leeway = 0;
    validation.validate_nbf = true;
    validation.set_required_spec_claims(&["exp"]);
    validation.set_issuer(&[&config.issuer_url]);
    validation.set_audience(&[&config.audience]);

    decode::<Map<String, Value>>(raw, key, &validation)
        .map(|_| ())
        .map_err(map_jwt_error)
}

fn map_jwt_error(err: JwtError) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired("exp has passed".to_string()),
        ErrorKind::ImmatureSignature => {
            TokenError::InvalidSignature("token is not valid yet (nbf)".to_string())
        }
        ErrorKind::InvalidIssuer => TokenError::InvalidIssuer(err.to_string()),
        ErrorKind::InvalidAudience => TokenError::InvalidAudience(err.to_string()),
        ErrorKind::MissingRequiredClaim(claim) => TokenError::MissingField(claim.clone()),
        _ => TokenError::InvalidSignature(err.to_string()),
    }
}

fn check_audience(claims: &DecodedClaims, config: &ValidatorConfig) -> TokenResult<()> {
    if claims.audiences().contains(&config.audience.as_str()) {
        Ok(())
    } else {
        Err(TokenError::InvalidAudience(format!(
            "{} not in {:?}",
            config.audience,
            claims.audiences()
        )))
    }
}

fn check_subject(claims: &DecodedClaims) -> TokenResult<()> {
    claims
        .sub()
        .map(|_| ())
        .ok_or_else(|| TokenError::MissingField("sub".to_string()))
}

fn check_scopes(claims: &DecodedClaims, expected: &[&str]) -> TokenResult<()> {
    let granted = claims
        .scopes()
        .ok_or_else(|| TokenError::InvalidScope("token carries no scopes claim".to_string()))?;

    if expected.is_empty() || expected.iter().any(|scope| granted.contains(scope)) {
        Ok(())
    } else {
        Err(TokenError::InvalidScope(format!(
            "none of {expected:?} granted by {granted:?}"
        )))
    }
}

fn check_lifetime(claims: &DecodedClaims, now: i64) -> TokenResult<()> {
    let iat = claims
        .iat()
        .ok_or_else(|| TokenError::MissingField("iat".to_string()))?;
    let exp = claims
        .exp()
        .ok_or_else(|| TokenError::MissingField("exp".to_string()))?;

    let now = now as f64;
    if now < iat {
        Err(TokenError::Expired(format!("issued in the future (iat {iat}, now {now})")))
    } else if now > exp {
        Err(TokenError::Expired(format!("expired at {exp}, now {now}")))
    } else {
        Ok(())
    }
}
