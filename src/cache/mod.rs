//! Synthesis cache.
//!
//! Maps (text, voice, speed) to previously synthesized audio. Every
//! operation is fail-soft: a disabled or unreachable store turns reads into
//! misses and writes into no-ops, logged but never raised.

pub mod key;
pub mod prewarm;
pub mod store;

pub use key::{CacheKey, key_prefix, normalize_text};
pub use prewarm::{PrewarmReport, common_phrases, prewarm};
pub use store::{CacheStore, MemoryStore};

use crate::config::CacheConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Length of the digest stored in front of each cached value.
const DIGEST_HEADER_LEN: usize = 64;

/// Snapshot returned by [`SynthesisCache::get_stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub connected: bool,
    pub entries: usize,
    pub ttl_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SynthesisCache {
    store: Option<Arc<dyn CacheStore>>,
    enabled: bool,
    default_ttl: Duration,
}

impl SynthesisCache {
    /// Build a cache over `store`.
    ///
    /// The store is pinged once; if unreachable the cache runs disconnected.
    pub fn new(config: &CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        let store = if !config.enabled {
            tracing::info!("synthesis cache disabled");
            None
        } else {
            match store.ping() {
                Ok(()) => Some(store),
                Err(e) => {
                    tracing::warn!(error = %e, "synthesis cache store unreachable, caching off");
                    None
                }
            }
        };
        Self {
            store,
            enabled: config.enabled,
            default_ttl: config.ttl(),
        }
    }

    /// In-process cache sized and aged per `config`.
    pub fn in_memory(config: &CacheConfig) -> Self {
        let store = MemoryStore::new(config.max_entries, config.ttl());
        Self::new(config, Arc::new(store))
    }

    /// Cache that always misses.
    pub fn disabled() -> Self {
        Self {
            store: None,
            enabled: false,
            default_ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    /// Store key for a request.
    pub fn key(&self, text: &str, voice_id: &str, speed: f32) -> String {
        CacheKey::new(text, voice_id, speed).key
    }

    /// Cached audio, or `None` on miss, failure, or when disabled.
    pub fn get(&self, text: &str, voice_id: &str, speed: f32) -> Option<Vec<u8>> {
        let store = self.store.as_ref()?;
        let key = CacheKey::new(text, voice_id, speed);
        let value = match store.get(&key.key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!(key = %key.key, "cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key.key, error = %e, "cache read failed");
                return None;
            }
        };
        if value.len() < DIGEST_HEADER_LEN || &value[..DIGEST_HEADER_LEN] != key.digest.as_bytes() {
            tracing::debug!(key = %key.key, "cache key collision, treating as miss");
            return None;
        }
        tracing::debug!(key = %key.key, bytes = value.len() - DIGEST_HEADER_LEN, "cache hit");
        Some(value[DIGEST_HEADER_LEN..].to_vec())
    }

    /// Store audio. `ttl` defaults to the configured lifetime. Failures are logged.
    pub fn set(&self, text: &str, voice_id: &str, audio: &[u8], speed: f32, ttl: Option<Duration>) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = CacheKey::new(text, voice_id, speed);
        let mut value = Vec::with_capacity(DIGEST_HEADER_LEN + audio.len());
        value.extend_from_slice(key.digest.as_bytes());
        value.extend_from_slice(audio);
        match store.set(&key.key, value, ttl.unwrap_or(self.default_ttl)) {
            Ok(()) => tracing::debug!(key = %key.key, bytes = audio.len(), "cached audio"),
            Err(e) => tracing::warn!(key = %key.key, error = %e, "cache write failed"),
        }
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, text: &str, voice_id: &str, speed: f32) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        let key = CacheKey::new(text, voice_id, speed);
        store.delete(&key.key).unwrap_or_else(|e| {
            tracing::warn!(key = %key.key, error = %e, "cache invalidate failed");
            false
        })
    }

    /// Remove every cached utterance. Returns the number removed.
    pub fn clear_all(&self) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        match store.delete_prefix(&key_prefix(None)) {
            Ok(removed) => {
                tracing::info!(removed, "synthesis cache cleared");
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "cache clear failed");
                0
            }
        }
    }

    pub fn get_stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            enabled: self.enabled,
            connected: self.store.is_some(),
            entries: 0,
            ttl_secs: self.default_ttl.as_secs(),
            error: None,
        };
        if let Some(store) = self.store.as_ref() {
            match store.count_prefix(&key_prefix(None)) {
                Ok(entries) => stats.entries = entries,
                Err(e) => stats.error = Some(e.to_string()),
            }
        }
        stats
    }
}

impl std::fmt::Debug for SynthesisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisCache")
            .field("enabled", &self.enabled)
            .field("connected", &self.is_connected())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
