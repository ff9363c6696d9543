//! Common test utilities for integration tests
//!
//! A wiremock server stands in for the identity provider; RSA keys are
//! generated once per test binary and shared.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use token_validator::{
    CredentialCache, CredentialCacheBuilder, DeploymentMode, TokenValidator, ValidatorConfig,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const AUDIENCE: &str = "https://api.example.com";
pub const CLIENT_ID: &str = "billing-service";
pub const CLIENT_SECRET: &str = "billing-secret";
pub const REQUESTED_SCOPE: &str = "idp:api";

pub const JWKS_PATH: &str = "/oauth/discovery/keys";
pub const TOKEN_PATH: &str = "/oauth/token";
pub const TOKEN_INFO_PATH: &str = "/oauth/token/info";
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// RSA signing key with its public JWK
pub struct TestKey {
    pub kid: String,
    pub private_pem: Vec<u8>,
    pub jwk: Value,
}

impl TestKey {
    fn generate(kid: &str) -> Self {
        use rsa::RsaPrivateKey;
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key");
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode private key")
            .as_bytes()
            .to_vec();

        let jwk = json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        });

        Self {
            kid: kid.to_string(),
            private_pem,
            jwk,
        }
    }

    /// Same key material advertised under another kid
    pub fn with_kid(&self, kid: &str) -> Self {
        let mut jwk = self.jwk.clone();
        jwk["kid"] = json!(kid);
        Self {
            kid: kid.to_string(),
            private_pem: self.private_pem.clone(),
            jwk,
        }
    }

    /// Sign `claims` with this key, naming its kid in the header
    pub fn sign(&self, claims: &Value, algorithm: Algorithm) -> String {
        let key = EncodingKey::from_rsa_pem(&self.private_pem).expect("Invalid RSA key");
        let mut header = Header::new(algorithm);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());

        encode(&header, claims, &key).expect("Failed to encode test JWT")
    }
}

/// Key advertised by the IdP
pub fn primary_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| TestKey::generate("key-2025-01"))
}

/// Second IdP key, used for rotation
pub fn rotated_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| TestKey::generate("key-2025-07"))
}

/// Key the IdP never published, reusing the primary kid
pub fn rogue_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| TestKey::generate("key-2025-01"))
}

/// Mock identity provider
pub struct MockIdp {
    pub server: MockServer,
}

impl MockIdp {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Issuer URL (plain HTTP, so configs use development mode)
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Serve `keys` from the JWKS endpoint, expecting exactly `calls` fetches
    pub async fn mock_jwks(&self, keys: &[&TestKey], calls: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .expect(calls)
            .named("jwks")
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` for the first fetch only; later mocks answer the rest
    pub async fn mock_jwks_once(&self, keys: &[&TestKey]) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .up_to_n_times(1)
            .expect(1)
            .named("jwks (first fetch)")
            .mount(&self.server)
            .await;
    }

    /// Successful client-credentials grant, expecting exactly `calls` requests
    pub async fn mock_token(&self, access_token: &str, expires_in: u64, calls: u64) {
        self.mock_token_delayed(access_token, expires_in, calls, Duration::ZERO)
            .await;
    }

    pub async fn mock_token_delayed(
        &self,
        access_token: &str,
        expires_in: u64,
        calls: u64,
        delay: Duration,
    ) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "access_token": access_token,
                        "token_type": "Bearer",
                        "expires_in": expires_in,
                        "scope": REQUESTED_SCOPE,
                    }))
                    .set_delay(delay),
            )
            .expect(calls)
            .named("token")
            .mount(&self.server)
            .await;
    }

    /// Number of requests the IdP received on `endpoint`
    pub async fn hits(&self, endpoint: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == endpoint)
            .count()
    }
}

pub fn jwks(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|key| key.jwk.clone()).collect::<Vec<_>>() })
}

/// Configuration pointing at the mock IdP
pub fn config(idp: &MockIdp) -> ValidatorConfig {
    let mut config = ValidatorConfig::new().with_deployment_mode(DeploymentMode::Development);
    config.configure([
        ("issuer_url", idp.issuer()),
        ("audience", AUDIENCE.to_string()),
        ("client_id", CLIENT_ID.to_string()),
        ("client_secret", CLIENT_SECRET.to_string()),
        ("requested_scope", REQUESTED_SCOPE.to_string()),
    ]);
    config
}

pub fn cache_builder(idp: &MockIdp) -> CredentialCacheBuilder {
    CredentialCache::builder(config(idp)).app_name("billing")
}

pub fn cache(idp: &MockIdp) -> Arc<CredentialCache> {
    Arc::new(cache_builder(idp).build().expect("Failed to build cache"))
}

pub fn validator(idp: &MockIdp) -> TokenValidator {
    TokenValidator::new(cache(idp))
}

/// Get current Unix timestamp
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64
}

/// Claims that pass every check against [`config`]
pub fn valid_claims(idp: &MockIdp) -> Value {
    let now = current_timestamp();
    json!({
        "sub": "user-123",
        "iss": idp.issuer(),
        "aud": [AUDIENCE],
        "iat": now,
        "exp": now + 600,
        "jti": "jti-1",
        "scopes": ["billing:read", "billing:write"],
        "partner_guid": "p_123",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp() {
        assert!(current_timestamp() > 1_700_000_000);
    }

    #[test]
    fn test_rogue_key_shadows_primary_kid() {
        assert_eq!(rogue_key().kid, primary_key().kid);
        assert_ne!(rogue_key().jwk["n"], primary_key().jwk["n"]);
    }
}
