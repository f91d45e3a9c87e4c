//! Bounded in-process cache tier (L1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::backend::CacheBackend;
use crate::cache::entry::{CacheEntry, CacheStats, StatsCounters, resolve_ttl};
use crate::config::duration_secs;
use crate::error::{HalberdError, Result};
use crate::metrics::MetricsCollector;

/// Configuration for [`MemoryCache`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries held at once.
    pub max_size: usize,
    /// TTL applied when the caller does not pass one. Zero never expires.
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        MemoryCacheConfig {
            max_size: 10_000,
            default_ttl: Duration::from_secs(3600),
        }
    }
}

impl MemoryCacheConfig {
    /// Reject a zero capacity.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(HalberdError::config("cache.l1.max_size must be at least 1"));
        }
        Ok(())
    }
}

/// In-memory cache with TTL expiry and frequency-aware eviction.
///
/// When full, inserting a new key evicts the entry with the fewest hits, ties
/// broken by oldest creation time (an LRU approximation that favours frequently
/// read entries). Expired entries are purged on every read and write rather than
/// by a background sweep.
#[derive(Debug)]
pub struct MemoryCache<V> {
    config: MemoryCacheConfig,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    stats: StatsCounters,
}

impl<V: Clone> MemoryCache<V> {
    /// Create an empty cache.
    pub fn new(config: MemoryCacheConfig) -> Self {
        tracing::debug!(
            event = "cache.l1.created",
            max_size = config.max_size,
            default_ttl_secs = config.default_ttl.as_secs_f64(),
            "in-memory cache created"
        );
        MemoryCache {
            config,
            entries: Mutex::new(HashMap::new()),
            stats: StatsCounters::new("memory"),
        }
    }

    /// Mirror hits, misses, evictions and size into `metrics` (label `tier=memory`).
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.stats.set_metrics(metrics);
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        self.stats.metrics()
    }

    /// Get the configuration.
    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Number of stored entries, including ones that expired but were not purged yet.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Hit count of the entry under `key`, if present.
    pub fn hits_of(&self, key: &str) -> Option<u64> {
        self.entries.lock().get(key).map(|entry| entry.hits)
    }

    fn purge_expired(&self, entries: &mut HashMap<String, CacheEntry<V>>) {
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        self.stats.record_evictions((before - entries.len()) as u64);
    }

    fn evict_one(&self, entries: &mut HashMap<String, CacheEntry<V>>) {
        let victim = entries
            .iter()
            .min_by(|(ka, a), (kb, b)| {
                a.hits
                    .cmp(&b.hits)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(ka.cmp(kb))
            })
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            entries.remove(&key);
            self.stats.record_evictions(1);
            tracing::trace!(event = "cache.l1.evicted", key = %key, "evicted cache entry");
        }
    }
}

impl<V: Clone + Send> CacheBackend<V> for MemoryCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        self.purge_expired(&mut entries);
        self.stats.set_size(entries.len());

        match entries.get_mut(key) {
            Some(entry) => {
                entry.record_hit();
                self.stats.record_hit();
                Some(entry.value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, resolve_ttl(ttl, self.config.default_ttl));

        let mut entries = self.entries.lock();
        self.purge_expired(&mut entries);
        if !entries.contains_key(key) && entries.len() >= self.config.max_size {
            self.evict_one(&mut entries);
        }
        entries.insert(key.to_string(), entry);
        self.stats.set_size(entries.len());
    }

    fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let removed = entries.remove(key).is_some();
        self.stats.set_size(entries.len());
        removed
    }

    fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.stats.set_size(0);
        tracing::info!(event = "cache.l1.cleared", "in-memory cache cleared");
    }

    fn exists(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
