//! Process-local cache backend
//!
//! Values are stored as JSON so both backends round-trip identically.
//! Expired entries are dropped lazily on read.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telbill_core::error::AppError;
use telbill_core::traits::CacheService;
use tracing::{debug, error};

struct Entry {
    json: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory cache with per-entry TTL
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_json(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.json.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // expired
        self.entries.write().remove(key);
        None
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.live_json(key) {
            Some(json) => {
                let value = serde_json::from_str::<T>(&json).map_err(|e| {
                    error!("Failed to deserialize value for key {}: {}", key, e);
                    AppError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                debug!("Cache HIT: {}", key);
                Ok(Some(value))
            }
            None => {
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError> {
        let json = serde_json::to_string(value)?;
        let entry = Entry {
            json,
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };

        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get::<String>("bill:1").await.unwrap(), None);

        cache.set("bill:1", &"3.96", 60).await.unwrap();
        assert_eq!(cache.get::<String>("bill:1").await.unwrap(), Some("3.96".to_string()));
        assert_eq!(cache.len(), 1);

        cache.set("bill:1", &"4.20", 60).await.unwrap();
        assert_eq!(cache.get::<String>("bill:1").await.unwrap(), Some("4.20".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let cache = MemoryCache::new();
        cache.set("bill:2", &1_u8, 0).await.unwrap();

        assert_eq!(cache.get::<u8>("bill:2").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_serialization_error() {
        let cache = MemoryCache::new();
        cache.set("bill:3", &"not a number", 60).await.unwrap();

        let result = cache.get::<i64>("bill:3").await;
        assert!(matches!(result, Err(AppError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = MemoryCache::new();
        let other = cache.clone();

        cache.set("bill:4", &4, 60).await.unwrap();
        assert_eq!(other.get::<i32>("bill:4").await.unwrap(), Some(4));
    }
}
