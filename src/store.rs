//! Key-value store adapter.
//!
//! [`CacheStore`] is the asynchronous GET / SET-with-TTL / DEL contract
//! around the external store; each method maps 1:1 onto the store's
//! primitive. This module also owns the stored representation: entries
//! are JSON text, produced and parsed by `encode`/`decode`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{CacherError, StoreError};

/// Asynchronous access to the key-value store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the text stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`. A positive `ttl_seconds` is forwarded
    /// verbatim to the store's expiration mechanism; zero means no
    /// expiration.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StoreError>;

    /// Remove `key`. Absence is not an error.
    async fn del(&self, key: &str) -> Result<(), StoreError>;
}

/// Encode a normalized value into stored text.
pub(crate) fn encode(value: &Value) -> Result<String, CacherError> {
    serde_json::to_string(value).map_err(|err| CacherError::serialization(err.to_string()))
}

/// Decode stored text back into the normalized shape.
pub(crate) fn decode(key: &str, text: &str) -> Result<Value, CacherError> {
    serde_json::from_str(text).map_err(|err| CacherError::decode(key, err.to_string()))
}

// ============================================================================
// MemoryStore
// ============================================================================

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Process-local [`CacheStore`] with per-entry expiration.
///
/// Backs the test suite and works as a stand-in store for single-process
/// deployments. Expired entries are dropped on read.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let guard = self.entries.read().await;
        guard.values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        match guard.get(key) {
            Some(entry) if entry.is_expired(now) => {
                guard.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        let expires_at =
            (ttl_seconds > 0).then(|| Instant::now() + Duration::from_secs(ttl_seconds));
        let mut guard = self.entries.write().await;
        guard.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut guard = self.entries.write().await;
        guard.remove(key);
        Ok(())
    }
}
