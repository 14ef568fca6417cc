use crate::{cache::CacheBackend, error::CacheError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    expires_at_ms: i64,
    payload: Vec<u8>,
}

/// Persistent backend on an embedded sled tree.
///
/// Expiry uses wall-clock time, so entries outlive the process and can be
/// shared by every session that opens the same path.
pub struct SledCacheBackend {
    db: sled::Db,
}

impl SledCacheBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl CacheBackend for SledCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let Some(bytes) = self.db.get(key)? else {
            return Ok(None);
        };

        let envelope: Envelope =
            bincode::deserialize(&bytes).map_err(|e| CacheError::Decode(e.to_string()))?;

        if envelope.expires_at_ms <= Self::now_ms() {
            debug!(key, "Cache entry expired");
            self.db.remove(key)?;
            return Ok(None);
        }

        Ok(Some(envelope.payload))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let envelope = Envelope {
            expires_at_ms: Self::now_ms().saturating_add(ttl_ms),
            payload: value,
        };
        let bytes = bincode::serialize(&envelope).map_err(|e| CacheError::Encode(e.to_string()))?;

        self.db.insert(key, bytes)?;
        Ok(())
    }
}
