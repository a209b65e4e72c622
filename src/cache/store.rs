//! Storage backends for the synthesis cache.

use crate::error::{Result, VoxbotError};
use mini_moka::sync::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Key/value store with per-entry expiry.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    fn count_prefix(&self, prefix: &str) -> Result<usize>;

    /// Check the store is reachable.
    fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
struct StoredValue {
    bytes: Arc<Vec<u8>>,
    expires_at: Instant,
}

/// In-process store backed by `mini-moka`.
///
/// The cache-wide time-to-live is a ceiling; each entry also carries its
/// own expiry, checked on read.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, StoredValue>,
}

impl MemoryStore {
    pub fn new(max_entries: u64, ttl_ceiling: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl_ceiling)
                .build(),
        }
    }

    fn live_keys(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.value().expires_at > now)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        match self.entries.get(&key) {
            Some(stored) if stored.expires_at > Instant::now() => {
                Ok(Some(stored.bytes.as_ref().clone()))
            }
            Some(_) => {
                self.entries.invalidate(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| VoxbotError::CacheStore {
                message: format!("entry lifetime {ttl:?} is out of range"),
            })?;
        self.entries.insert(
            key.to_string(),
            StoredValue {
                bytes: Arc::new(value),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let existed = self.get(key)?.is_some();
        self.entries.invalidate(&key.to_string());
        Ok(existed)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.live_keys(prefix);
        for key in &keys {
            self.entries.invalidate(key);
        }
        Ok(keys.len())
    }

    fn count_prefix(&self, prefix: &str) -> Result<usize> {
        Ok(self.live_keys(prefix).len())
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
