//! Two-level (memory → disk) cache for representation vectors.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::cache::backend::CacheBackend;
use crate::cache::entry::CacheStats;
use crate::cache::file::{FileCache, FileCacheConfig, sha256_hex};
use crate::cache::memory::MemoryCache;
use crate::error::Result;
use crate::metrics::{CACHE_PROMOTIONS, MetricsCollector};

/// Counters of both tiers plus the model the cache is versioned by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredCacheStats {
    /// Model identifier mixed into every key.
    pub model: String,
    /// In-memory tier counters.
    pub l1: CacheStats,
    /// On-disk tier counters.
    pub l2: CacheStats,
}

/// A memory tier in front of a disk tier, keyed by `sha256("{model}:{text}")`.
///
/// Mixing the model identifier into the key means switching models never
/// serves vectors produced by the previous one, without any migration.
///
/// Reads check L1, then L2; an L2 hit is written back to L1 ("promotion")
/// before returning. Writes go to both tiers.
pub struct TieredCache<V> {
    l1: Arc<dyn CacheBackend<V>>,
    l2: Arc<dyn CacheBackend<V>>,
    model: String,
    metrics: Arc<MetricsCollector>,
}

impl<V> std::fmt::Debug for TieredCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("l1", &self.l1.name())
            .field("l2", &self.l2.name())
            .field("model", &self.model)
            .finish()
    }
}

impl<V: Clone> TieredCache<V> {
    /// Compose two existing tiers.
    pub fn new<S: Into<String>>(
        l1: Arc<dyn CacheBackend<V>>,
        l2: Arc<dyn CacheBackend<V>>,
        model: S,
    ) -> Self {
        let model = model.into();
        tracing::info!(
            event = "cache.tiered.created",
            model = %model,
            l1 = l1.name(),
            l2 = l2.name(),
            "tiered cache created"
        );
        TieredCache {
            l1,
            l2,
            model,
            metrics: MetricsCollector::shared(),
        }
    }

    /// Count L2 → L1 promotions in `metrics`.
    ///
    /// Tiers built by [`from_config_with_metrics`](Self::from_config_with_metrics)
    /// report into the same collector.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Model identifier the keys are versioned by.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The memory tier.
    pub fn l1(&self) -> &Arc<dyn CacheBackend<V>> {
        &self.l1
    }

    /// The disk tier.
    pub fn l2(&self) -> &Arc<dyn CacheBackend<V>> {
        &self.l2
    }

    /// Cache key for `text` under this cache's model.
    pub fn key_for(&self, text: &str) -> String {
        sha256_hex(&format!("{}:{}", self.model, text))
    }

    /// Look up the value cached for `text`.
    pub fn get(&self, text: &str) -> Option<V> {
        let key = self.key_for(text);

        if let Some(value) = self.l1.get(&key) {
            tracing::debug!(event = "cache.tiered.l1_hit", text_len = text.len(), "L1 hit");
            return Some(value);
        }

        if let Some(value) = self.l2.get(&key) {
            self.l1.set(&key, value.clone(), None);
            self.metrics.increment(CACHE_PROMOTIONS, &[("model", self.model.as_str())]);
            tracing::debug!(event = "cache.tiered.l2_hit", text_len = text.len(), "L2 hit, promoted to L1");
            return Some(value);
        }

        tracing::debug!(event = "cache.tiered.miss", text_len = text.len(), "cache miss");
        None
    }

    /// Store `value` for `text` in both tiers.
    pub fn set(&self, text: &str, value: V) {
        let key = self.key_for(text);
        self.l1.set(&key, value.clone(), None);
        self.l2.set(&key, value, None);
        tracing::debug!(event = "cache.tiered.stored", text_len = text.len(), "value cached");
    }

    /// Look up several texts; the result is aligned with `texts`.
    pub fn get_many<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Option<V>> {
        texts.iter().map(|text| self.get(text.as_ref())).collect()
    }

    /// Store several `(text, value)` pairs.
    pub fn set_many<I, S>(&self, items: I)
    where
        I: IntoIterator<Item = (S, V)>,
        S: AsRef<str>,
    {
        for (text, value) in items {
            self.set(text.as_ref(), value);
        }
    }

    /// Remove `text` from both tiers. Returns `true` if either tier held it.
    pub fn delete(&self, text: &str) -> bool {
        let key = self.key_for(text);
        let in_l1 = self.l1.delete(&key);
        let in_l2 = self.l2.delete(&key);
        in_l1 || in_l2
    }

    /// Empty both tiers.
    pub fn clear(&self) {
        self.l1.clear();
        self.l2.clear();
    }

    /// Counters of both tiers.
    pub fn stats(&self) -> TieredCacheStats {
        TieredCacheStats {
            model: self.model.clone(),
            l1: self.l1.stats(),
            l2: self.l2.stats(),
        }
    }
}

impl<V> TieredCache<V>
where
    V: Clone + Send + Serialize + DeserializeOwned + 'static,
{
    /// Build a memory + file cache for `model` from configuration.
    ///
    /// Each model gets its own subdirectory under the configured L2 directory,
    /// so clearing one model's cache leaves the others intact.
    pub fn from_config(config: &CacheConfig, model: &str) -> Result<Self> {
        Self::from_config_with_metrics(config, model, MetricsCollector::shared())
    }

    /// [`from_config`](Self::from_config) with both tiers and the promotion
    /// counter reporting into `metrics`.
    pub fn from_config_with_metrics(config: &CacheConfig, model: &str, metrics: Arc<MetricsCollector>) -> Result<Self> {
        config.validate()?;
        let l1: Arc<dyn CacheBackend<V>> =
            Arc::new(MemoryCache::new(config.l1.clone()).with_metrics(Arc::clone(&metrics)));
        let l2: Arc<dyn CacheBackend<V>> = Arc::new(
            FileCache::new(FileCacheConfig {
                directory: config.l2.directory.join(model_dir_name(model)),
                default_ttl: config.l2.default_ttl,
            })?
            .with_metrics(Arc::clone(&metrics)),
        );
        Ok(Self::new(l1, l2, model).with_metrics(metrics))
    }
}

/// File-system friendly directory name for a model identifier.
pub fn model_dir_name(model: &str) -> String {
    let name: String = model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::cache::memory::MemoryCacheConfig;

    fn config(dir: &TempDir) -> CacheConfig {
        CacheConfig {
            l1: MemoryCacheConfig {
                max_size: 100,
                default_ttl: Duration::from_secs(3600),
            },
            l2: FileCacheConfig {
                directory: dir.path().to_path_buf(),
                default_ttl: Duration::from_secs(3600),
            },
        }
    }

    #[test]
    fn test_set_and_get() {
        let dir = TempDir::new().unwrap();
        let cache: TieredCache<Vec<f32>> = TieredCache::from_config(&config(&dir), "model-a").unwrap();

        cache.set("hello world", vec![0.1, 0.2]);
        assert_eq!(cache.get("hello world"), Some(vec![0.1, 0.2]));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_l1_hit_skips_l2() {
        let dir = TempDir::new().unwrap();
        let cache: TieredCache<Vec<f32>> = TieredCache::from_config(&config(&dir), "model-a").unwrap();
        cache.set("text", vec![1.0]);

        cache.get("text");
        let stats = cache.stats();
        assert_eq!(stats.l1.hits, 1);
        assert_eq!(stats.l2.hits + stats.l2.misses, 0);
    }

    #[test]
    fn test_l2_hit_promotes_to_l1() {
        let dir = TempDir::new().unwrap();
        let cache: TieredCache<Vec<f32>> = TieredCache::from_config(&config(&dir), "model-a").unwrap();
        let key = cache.key_for("only on disk");
        cache.l2().set(&key, vec![3.0], None);

        assert_eq!(cache.get("only on disk"), Some(vec![3.0]));
        assert_eq!(cache.get("only on disk"), Some(vec![3.0]));

        let stats = cache.stats();
        assert_eq!(stats.l2.hits, 1);
        assert_eq!(stats.l1.hits, 1);
        assert!(cache.l1().exists(&key));
    }

    #[test]
    fn test_promotion_metrics() {
        use crate::metrics::{CACHE_HITS, CACHE_MISSES};

        let dir = TempDir::new().unwrap();
        let metrics = MetricsCollector::shared();
        let cache: TieredCache<Vec<f32>> =
            TieredCache::from_config_with_metrics(&config(&dir), "model-a", Arc::clone(&metrics)).unwrap();
        cache.l2().set(&cache.key_for("cold"), vec![1.0], None);

        cache.get("cold");
        cache.get("cold");
        cache.get("absent");

        assert_eq!(metrics.counter(CACHE_PROMOTIONS, &[("model", "model-a")]), 1);
        assert_eq!(metrics.counter(CACHE_HITS, &[("tier", "memory")]), 1);
        assert_eq!(metrics.counter(CACHE_HITS, &[("tier", "file")]), 1);
        assert_eq!(metrics.counter(CACHE_MISSES, &[("tier", "memory")]), 2);
        assert_eq!(metrics.counter(CACHE_MISSES, &[("tier", "file")]), 1);
    }

    #[test]
    fn test_model_versioning() {
        let dir = TempDir::new().unwrap();
        let a: TieredCache<Vec<f32>> = TieredCache::from_config(&config(&dir), "model-a").unwrap();
        let b: TieredCache<Vec<f32>> = TieredCache::from_config(&config(&dir), "model-b").unwrap();

        a.set("same text", vec![1.0]);

        assert_ne!(a.key_for("same text"), b.key_for("same text"));
        assert_eq!(b.get("same text"), None);
    }

    #[test]
    fn test_key_is_sha256_of_model_and_text() {
        let dir = TempDir::new().unwrap();
        let cache: TieredCache<u8> = TieredCache::from_config(&config(&dir), "m").unwrap();
        assert_eq!(cache.key_for("t"), sha256_hex("m:t"));
        assert_eq!(cache.key_for("t").len(), 64);
    }

    #[test]
    fn test_get_many_and_set_many() {
        let dir = TempDir::new().unwrap();
        let cache: TieredCache<Vec<f32>> = TieredCache::from_config(&config(&dir), "m").unwrap();
        cache.set_many(vec![("a", vec![1.0]), ("b", vec![2.0])]);

        let values = cache.get_many(&["a", "missing", "b"]);
        assert_eq!(values, vec![Some(vec![1.0]), None, Some(vec![2.0])]);
    }

    #[test]
    fn test_delete_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache: TieredCache<u8> = TieredCache::from_config(&config(&dir), "m").unwrap();
        cache.set("a", 1);
        cache.set("b", 2);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.get("a"), None);

        cache.clear();
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.stats().l1.size, 0);
        assert_eq!(cache.stats().l2.size, 0);
    }

    #[test]
    fn test_model_dir_name() {
        assert_eq!(model_dir_name("text-embedding-3-small"), "text-embedding-3-small");
        assert_eq!(model_dir_name("org/model:v1"), "org_model_v1");
        assert_eq!(model_dir_name(""), "default");
        assert_eq!(model_dir_name(".."), "default");
    }
}
