//! One tiered cache per model identifier.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::CacheConfig;
use crate::cache::tiered::TieredCache;
use crate::error::Result;
use crate::metrics::MetricsCollector;

/// Lazily creates and then reuses one [`TieredCache`] per model.
///
/// The registry is an ordinary value owned by whoever wires the application
/// together and shared by `Arc`; there is no process-wide instance.
#[derive(Debug)]
pub struct CacheRegistry<V> {
    config: CacheConfig,
    caches: Mutex<HashMap<String, Arc<TieredCache<V>>>>,
    metrics: Arc<MetricsCollector>,
}

impl<V> CacheRegistry<V>
where
    V: Clone + Send + Serialize + DeserializeOwned + 'static,
{
    /// Create an empty registry; caches are built from `config` on first use.
    pub fn new(config: CacheConfig) -> Self {
        CacheRegistry {
            config,
            caches: Mutex::new(HashMap::new()),
            metrics: MetricsCollector::shared(),
        }
    }

    /// Caches created from now on report into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// The cache for `model`, creating it on first use.
    pub fn get_or_create(&self, model: &str) -> Result<Arc<TieredCache<V>>> {
        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(model) {
            return Ok(Arc::clone(cache));
        }
        let cache = Arc::new(TieredCache::from_config_with_metrics(
            &self.config,
            model,
            Arc::clone(&self.metrics),
        )?);
        caches.insert(model.to_string(), Arc::clone(&cache));
        Ok(cache)
    }

    /// The cache for `model`, if it was already created.
    pub fn get(&self, model: &str) -> Option<Arc<TieredCache<V>>> {
        self.caches.lock().get(model).cloned()
    }

    /// Models with a live cache, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.caches.lock().keys().cloned().collect();
        models.sort();
        models
    }
}
