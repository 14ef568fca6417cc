//! Page-level cache addressed by query fingerprint and page number.

use crate::error::CacheError;
use async_trait::async_trait;
use model::pagination::page::Page;
use std::{sync::Arc, time::Duration};

pub mod memory;
pub mod redis_store;
pub mod sled_store;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_KEY_PREFIX: &str = "pager_page";

/// Key-value store behind the page cache. Values are opaque bytes.
///
/// Concurrent writers to one key race; the last write wins.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}

/// Stable hash of a session's query text.
pub fn fingerprint(query_text: &str) -> String {
    blake3::hash(query_text.as_bytes()).to_hex().to_string()
}

#[derive(Clone)]
pub struct PageCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    key_prefix: String,
}

impl PageCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        PageCache {
            backend,
            ttl: DEFAULT_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn key(&self, fingerprint: &str, page_number: usize) -> String {
        format!("{}:{}:{}", self.key_prefix, fingerprint, page_number)
    }

    /// Returns the stored page if present and unexpired.
    pub async fn get(
        &self,
        fingerprint: &str,
        page_number: usize,
    ) -> Result<Option<Page>, CacheError> {
        let key = self.key(fingerprint, page_number);
        match self.backend.get(&key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CacheError::Decode(e.to_string())),
            None => Ok(None),
        }
    }

    /// Stores `page` for the cache TTL, replacing any previous entry.
    pub async fn put(
        &self,
        fingerprint: &str,
        page_number: usize,
        page: &Page,
    ) -> Result<(), CacheError> {
        let key = self.key(fingerprint, page_number);
        let bytes = serde_json::to_vec(page).map_err(|e| CacheError::Encode(e.to_string()))?;
        self.backend.set(&key, bytes, self.ttl).await
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("ttl", &self.ttl)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}
