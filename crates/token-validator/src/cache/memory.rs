//! In-process cache store

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::CacheStore;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// [`CacheStore`] held in process memory
///
/// Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including ones that expired but were not read yet
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());

        if live.is_none() {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        live
    }

    async fn write(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn clear(&self, namespace: &str) {
        let prefix = format!("{namespace}:");
        self.entries.retain(|key, _| !key.starts_with(&prefix));
    }
}
