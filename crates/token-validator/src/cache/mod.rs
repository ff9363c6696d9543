//! Credential caching
//!
//! - [`CacheStore`] is the pluggable external cache (Redis, memcached, ...).
//!   Values are JSON so any key/value backend can hold them.
//! - [`MemoryStore`] is the in-process store used when nothing else is attached.
//! - [`CredentialCache`] owns the IdP signing-key set and the outbound
//!   client-credentials token, and is the only component that talks to the IdP.

mod credentials;
mod memory;

pub use credentials::{
    CachedAccessToken, CredentialCache, CredentialCacheBuilder, DEFAULT_KEY_SET_TTL,
    DiscoveryDocument, KeySetSource, TOKEN_RENEWAL_BUFFER,
};
pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Namespace suffix shared by every key the cache writes
pub const CACHE_NAMESPACE: &str = "oauth_token_service";

/// Key/value store with optional per-entry expiry
///
/// Writes replace the whole entry; a reader observes either the previous
/// value or the new one.
#[async_trait]
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Current value, `None` if absent or expired
    async fn read(&self, key: &str) -> Option<Value>;

    /// Store `value`, replacing any previous entry
    async fn write(&self, key: &str, value: Value, ttl: Option<Duration>);

    /// Remove a single entry
    async fn delete(&self, key: &str);

    /// Remove every entry whose key starts with `{namespace}:`
    async fn clear(&self, namespace: &str);
}

/// `{sha256_hex(lowercase app name)}_oauth_token_service`
///
/// Hashing keeps arbitrary application names safe for any store's key syntax
/// while still isolating applications that share a backend.
pub fn namespace_for(app_name: &str) -> String {
    let digest = Sha256::digest(app_name.to_lowercase().as_bytes());
    format!("{digest:x}_{CACHE_NAMESPACE}")
}

pub(crate) fn namespaced(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}
