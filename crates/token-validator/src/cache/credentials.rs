//! IdP signing keys and client-credentials tokens
//!
//! [`CredentialCache`] keeps the IdP's JWKS and an outbound access token
//! behind a [`CacheStore`], so the IdP is only contacted on a miss:
//!
//! - **Signing key set**: cached with a TTL (default 10 minutes) and dropped on
//!   demand by [`CredentialCache::invalidate_signing_key_set`] when a token
//!   names a key we have not seen.
//! - **Access token**: cached until three minutes before it actually expires,
//!   so a borrowed token is never presented to a peer after true expiry.
//!
//! Network trouble never escapes this module. Timeouts, refused connections,
//! non-2xx responses and malformed bodies are logged and surface as an empty
//! key set or `None`, which the validator treats as an ordinary failure.
//!
//! Concurrent misses are coalesced: refreshes of each value are serialised
//! and a caller that waited re-reads the store before going to the network.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeDelta, Utc};
use http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
use jsonwebtoken::jwk::JwkSet;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{CacheStore, MemoryStore, namespace_for, namespaced};
use crate::config::{ConfigHandle, ValidatorConfig};
use crate::error::TransportError;
use crate::http::{HttpReply, IdpHttpClient, ReqwestIdpClient};

/// Tokens are renewed this long before their real expiry
pub const TOKEN_RENEWAL_BUFFER: Duration = Duration::from_secs(180);

/// Default signing key set TTL (10 minutes)
pub const DEFAULT_KEY_SET_TTL: Duration = Duration::from_secs(600);

const ISSUER_JWKS_KEY: &str = "issuer-jwks";
const ACCESS_TOKEN_KEY: &str = "access-token";
const DISCOVERY_KEY: &str = "openid-configuration";

/// Where the signing key set is downloaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySetSource {
    /// `{issuer}/oauth/discovery/keys`, token endpoint `{issuer}/oauth/token`
    #[default]
    Fixed,
    /// `jwks_uri` and `token_endpoint` from `{issuer}/.well-known/openid-configuration`
    OpenIdDiscovery,
}

/// OpenID Connect discovery document
///
/// Only the two endpoints this crate uses are typed; everything else is kept
/// as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// JWKS endpoint
    pub jwks_uri: String,
    /// OAuth token endpoint
    pub token_endpoint: String,
    /// All other fields
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

/// Client-credentials access token with its expiry
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedAccessToken {
    /// Bearer token value
    pub token: String,
    /// Absolute expiry reported by the IdP
    pub expires_at: DateTime<Utc>,
    /// Lifetime in seconds as issued
    pub expires_in: u64,
}

// Manual Debug impl to prevent token exposure in logs
impl std::fmt::Debug for CachedAccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedAccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl CachedAccessToken {
    /// Token issued at `now` that lives for `expires_in` seconds
    pub fn issued_at(token: String, expires_in: u64, now: DateTime<Utc>) -> Self {
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            token,
            expires_at,
            expires_in,
        }
    }

    /// Whether the token may still be handed out at `now`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now.checked_add_signed(renewal_buffer())
            .is_some_and(|renew_at| renew_at < self.expires_at)
    }

    /// Store TTL honouring the renewal buffer; `None` when too short-lived to cache
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.expires_in
            .checked_sub(TOKEN_RENEWAL_BUFFER.as_secs())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn renewal_buffer() -> TimeDelta {
    TimeDelta::seconds(TOKEN_RENEWAL_BUFFER.as_secs() as i64)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Cache of IdP credentials shared by every validation
///
/// Build one per process at the composition root and share it through `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// # use token_validator::{CredentialCache, ValidatorConfig};
/// # tokio_test::block_on(async {
/// let mut config = ValidatorConfig::new();
/// config.configure([("issuer_url", "https://idp.example.com")]);
///
/// let cache = CredentialCache::builder(config).app_name("billing").build()?;
/// let keys = cache.signing_key_set().await;
/// println!("{} signing keys", keys.keys.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub struct CredentialCache {
    config: ConfigHandle,
    http: Arc<dyn IdpHttpClient>,
    store: Option<Arc<dyn CacheStore>>,
    namespace: String,
    source: KeySetSource,
    key_set_ttl: Duration,
    key_set_refresh: Mutex<()>,
    token_refresh: Mutex<()>,
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("namespace", &self.namespace)
            .field("source", &self.source)
            .field("key_set_ttl", &self.key_set_ttl)
            .field("pass_through", &self.store.is_none())
            .finish()
    }
}

impl CredentialCache {
    /// Start building a cache for `config`
    pub fn builder(config: impl Into<ConfigHandle>) -> CredentialCacheBuilder {
        CredentialCacheBuilder::new(config.into())
    }

    /// Shared configuration handle
    pub fn config_handle(&self) -> &ConfigHandle {
        &self.config
    }

    /// Namespace prefixing every store key
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether every call goes to the network
    pub fn is_pass_through(&self) -> bool {
        self.store.is_none()
    }

    /// Current signing key set
    ///
    /// Downloads on a miss. A failed download yields an empty set and is not
    /// cached, so the next call tries again.
    pub async fn signing_key_set(&self) -> JwkSet {
        let Some(store) = &self.store else {
            return self.download_signing_key_set().await.unwrap_or_else(empty_key_set);
        };

        if let Some(keys) = self.cached_key_set(store.as_ref()).await {
            debug!(key_count = keys.keys.len(), "Using cached signing key set");
            return keys;
        }

        let _refresh = self.key_set_refresh.lock().await;
        if let Some(keys) = self.cached_key_set(store.as_ref()).await {
            debug!("Signing key set refreshed by a concurrent caller");
            return keys;
        }

        let Some(keys) = self.download_signing_key_set().await else {
            return empty_key_set();
        };

        match serde_json::to_value(&keys) {
            Ok(value) => {
                store
                    .write(&self.key(ISSUER_JWKS_KEY), value, Some(self.key_set_ttl))
                    .await;
            }
            Err(e) => warn!(error = %e, "Could not serialize signing key set for caching"),
        }
        keys
    }

    /// Drop the cached signing key set; the next read downloads it again
    pub async fn invalidate_signing_key_set(&self) {
        if let Some(store) = &self.store {
            store.delete(&self.key(ISSUER_JWKS_KEY)).await;
            debug!("Signing key set invalidated");
        }
    }

    /// Outbound access token from the client-credentials grant
    ///
    /// Returns the cached token until three minutes before its expiry, then
    /// requests a new one. `None` when the IdP cannot be reached or refuses.
    pub async fn client_credentials_token(&self) -> Option<CachedAccessToken> {
        let Some(store) = &self.store else {
            return self.request_access_token().await;
        };

        if let Some(token) = self.cached_access_token(store.as_ref()).await {
            return Some(token);
        }

        let _refresh = self.token_refresh.lock().await;
        if let Some(token) = self.cached_access_token(store.as_ref()).await {
            return Some(token);
        }

        let token = self.request_access_token().await?;
        match (token.cache_ttl(), serde_json::to_value(&token)) {
            (Some(ttl), Ok(value)) => {
                store
                    .write(&self.key(ACCESS_TOKEN_KEY), value, Some(ttl))
                    .await;
            }
            (None, _) => debug!(
                expires_in = token.expires_in,
                "Access token too short-lived to cache"
            ),
            (_, Err(e)) => warn!(error = %e, "Could not serialize access token for caching"),
        }
        Some(token)
    }

    /// `Authorization: Basic base64("{token}:")`, empty without a token
    pub async fn basic_auth_header(&self) -> HeaderMap {
        match self.client_credentials_token().await {
            Some(token) => {
                authorization_header(&format!("Basic {}", STANDARD.encode(format!("{}:", token.token))))
            }
            None => HeaderMap::new(),
        }
    }

    /// `Authorization: Bearer {token}`, empty without a token
    pub async fn bearer_auth_header(&self) -> HeaderMap {
        match self.client_credentials_token().await {
            Some(token) => authorization_header(&format!("Bearer {}", token.token)),
            None => HeaderMap::new(),
        }
    }

    /// Ask the IdP about a token via `{issuer}/oauth/token/info`
    ///
    /// `None` for an empty token or any failure.
    pub async fn token_info(&self, token: &str) -> Option<Value> {
        if token.is_empty() {
            return None;
        }

        let url = self.config.config().oauth_path("token/info");
        let reply = self.http.get(&url, Some(token)).await;
        parse_reply("token info", &url, reply)
    }

    /// Evict every entry in this cache's namespace
    pub async fn clear(&self) {
        if let Some(store) = &self.store {
            store.clear(&self.namespace).await;
            debug!(namespace = %self.namespace, "Credential cache cleared");
        }
    }

    fn key(&self, name: &str) -> String {
        namespaced(&self.namespace, name)
    }

    async fn cached_key_set(&self, store: &dyn CacheStore) -> Option<JwkSet> {
        let value = store.read(&self.key(ISSUER_JWKS_KEY)).await?;
        serde_json::from_value(value)
            .inspect_err(|e| warn!(error = %e, "Discarding unreadable cached signing key set"))
            .ok()
    }

    async fn cached_access_token(&self, store: &dyn CacheStore) -> Option<CachedAccessToken> {
        let value = store.read(&self.key(ACCESS_TOKEN_KEY)).await?;
        let token: CachedAccessToken = serde_json::from_value(value)
            .inspect_err(|e| warn!(error = %e, "Discarding unreadable cached access token"))
            .ok()?;

        if token.is_fresh_at(Utc::now()) {
            Some(token)
        } else {
            debug!("Cached access token is inside its renewal window");
            None
        }
    }

    async fn download_signing_key_set(&self) -> Option<JwkSet> {
        let url = match self.source {
            KeySetSource::Fixed => self.config.config().oauth_path("discovery/keys"),
            KeySetSource::OpenIdDiscovery => self.discovery_document().await?.jwks_uri,
        };

        info!(url = %url, "Fetching signing key set");
        let reply = self.http.get(&url, None).await;
        let keys: JwkSet = parse_reply("signing key set", &url, reply)?;

        info!(url = %url, key_count = keys.keys.len(), "Fetched signing key set");
        Some(keys)
    }

    async fn request_access_token(&self) -> Option<CachedAccessToken> {
        let config = self.config.config();
        let url = self.token_endpoint(&config).await?;
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret().as_str()),
            ("scope", config.requested_scope.as_str()),
        ];

        info!(url = %url, client_id = %config.client_id, "Requesting client-credentials token");
        let reply = self.http.post_form(&url, &form).await;
        let response: TokenResponse = parse_reply("access token", &url, reply)?;

        Some(CachedAccessToken::issued_at(
            response.access_token,
            response.expires_in,
            Utc::now(),
        ))
    }

    async fn token_endpoint(&self, config: &ValidatorConfig) -> Option<String> {
        match self.source {
            KeySetSource::Fixed => Some(config.oauth_path("token")),
            KeySetSource::OpenIdDiscovery => {
                self.discovery_document().await.map(|doc| doc.token_endpoint)
            }
        }
    }

    /// Discovery document, cached without a TTL of its own
    async fn discovery_document(&self) -> Option<DiscoveryDocument> {
        let key = self.key(DISCOVERY_KEY);
        if let Some(store) = &self.store
            && let Some(value) = store.read(&key).await
            && let Ok(doc) = serde_json::from_value::<DiscoveryDocument>(value)
        {
            return Some(doc);
        }

        let url = discovery_url(&self.config.config().issuer_url);
        debug!(url = %url, "Fetching OpenID discovery document");
        let reply = self.http.get(&url, None).await;
        let doc: DiscoveryDocument = parse_reply("discovery document", &url, reply)?;

        if let Some(store) = &self.store
            && let Ok(value) = serde_json::to_value(&doc)
        {
            store.write(&key, value, None).await;
        }
        Some(doc)
    }
}

/// Builder for [`CredentialCache`]
pub struct CredentialCacheBuilder {
    config: ConfigHandle,
    http: Option<Arc<dyn IdpHttpClient>>,
    store: Option<Arc<dyn CacheStore>>,
    pass_through: bool,
    app_name: String,
    source: KeySetSource,
    key_set_ttl: Duration,
}

impl CredentialCacheBuilder {
    fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            http: None,
            store: None,
            pass_through: false,
            app_name: env!("CARGO_PKG_NAME").to_string(),
            source: KeySetSource::default(),
            key_set_ttl: DEFAULT_KEY_SET_TTL,
        }
    }

    /// Use a custom HTTP collaborator (default: [`ReqwestIdpClient`])
    #[must_use]
    pub fn http_client(mut self, http: Arc<dyn IdpHttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Attach an external cache store (default: a fresh [`MemoryStore`])
    #[must_use]
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self.pass_through = false;
        self
    }

    /// Detach the store: every read goes to the IdP
    #[must_use]
    pub fn pass_through(mut self) -> Self {
        self.store = None;
        self.pass_through = true;
        self
    }

    /// Host application name used to derive the cache namespace
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Where to find the signing key set
    #[must_use]
    pub fn key_set_source(mut self, source: KeySetSource) -> Self {
        self.source = source;
        self
    }

    /// Signing key set TTL
    #[must_use]
    pub fn key_set_ttl(mut self, ttl: Duration) -> Self {
        self.key_set_ttl = ttl;
        self
    }

    /// Build the cache
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if no HTTP client was supplied and the
    /// default one cannot be created.
    pub fn build(self) -> Result<CredentialCache, TransportError> {
        let http: Arc<dyn IdpHttpClient> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestIdpClient::new()?),
        };

        let store = match (self.store, self.pass_through) {
            (_, true) => None,
            (Some(store), false) => Some(store),
            (None, false) => Some(Arc::new(MemoryStore::new()) as Arc<dyn CacheStore>),
        };

        Ok(CredentialCache {
            config: self.config,
            http,
            store,
            namespace: namespace_for(&self.app_name),
            source: self.source,
            key_set_ttl: self.key_set_ttl,
            key_set_refresh: Mutex::new(()),
            token_refresh: Mutex::new(()),
        })
    }
}

fn empty_key_set() -> JwkSet {
    JwkSet { keys: Vec::new() }
}

fn discovery_url(issuer: &str) -> String {
    format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'))
}

fn authorization_header(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(value) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Err(e) => warn!(error = %e, "Access token is not a valid header value"),
    }
    headers
}

/// Decode a 2xx JSON reply, logging and discarding anything else
fn parse_reply<T: DeserializeOwned>(
    what: &str,
    url: &str,
    reply: Result<HttpReply, TransportError>,
) -> Option<T> {
    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            error!(url = %url, error = %e, "Failed to fetch {what}");
            return None;
        }
    };

    if !reply.status.is_success() {
        error!(url = %url, status = %reply.status, "IdP returned error status for {what}");
        return None;
    }

    serde_json::from_slice(&reply.body)
        .inspect_err(|e| error!(url = %url, error = %e, "Failed to parse {what}"))
        .ok()
}
