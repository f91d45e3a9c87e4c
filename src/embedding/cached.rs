//! Cache-first, retrying wrappers around representation providers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::registry::CacheRegistry;
use crate::cache::tiered::TieredCache;
use crate::embedding::provider::{AsyncEmbeddingProvider, EmbeddingProvider};
use crate::error::{HalberdError, Result};
use crate::resilience::retry::{AsyncRetryPolicy, RetryConfig, RetryPolicy};

/// Blocking provider that serves vectors from a [`TieredCache`] and only calls
/// the wrapped provider, under a retry policy, on a miss.
#[derive(Debug)]
pub struct CachedEmbedder<P> {
    inner: P,
    cache: Arc<TieredCache<Vec<f32>>>,
    retry: RetryPolicy<HalberdError>,
}

impl<P: EmbeddingProvider> CachedEmbedder<P> {
    /// Wrap `inner`, retrying transient failures with the embedding-service preset.
    pub fn new(inner: P, cache: Arc<TieredCache<Vec<f32>>>) -> Self {
        warn_on_model_mismatch(inner.model_id(), &cache);
        CachedEmbedder {
            inner,
            cache,
            retry: RetryPolicy::<HalberdError>::transient(RetryConfig::embedding_service()),
        }
    }

    /// Wrap `inner` with the registry's cache for its model.
    pub fn from_registry(inner: P, registry: &CacheRegistry<Vec<f32>>) -> Result<Self> {
        let cache = registry.get_or_create(inner.model_id())?;
        Ok(Self::new(inner, cache))
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy<HalberdError>) -> Self {
        self.retry = retry;
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<TieredCache<Vec<f32>>> {
        &self.cache
    }
}

impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbedder<P> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cache.get(text) {
            return Ok(vector);
        }
        let vector = self.retry.call(|| self.inner.embed(text))?;
        self.cache.set(text, vector.clone());
        Ok(vector)
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let cached = self.cache.get_many(texts);
        let (missing_idx, missing): (Vec<usize>, Vec<String>) = cached
            .iter()
            .enumerate()
            .filter(|(_, hit)| hit.is_none())
            .map(|(i, _)| (i, texts[i].clone()))
            .unzip();

        let fresh = if missing.is_empty() {
            Vec::new()
        } else {
            tracing::debug!(
                event = "embedding.cached.batch",
                total = texts.len(),
                missing = missing.len(),
                "embedding cache misses sent to provider"
            );
            let fresh = self.retry.call(|| self.inner.embed_many(&missing))?;
            check_batch_len(missing.len(), fresh.len())?;
            self.cache.set_many(missing.iter().zip(fresh.iter().cloned()));
            fresh
        };

        Ok(merge_batch(cached, &missing_idx, fresh))
    }
}

/// Async counterpart of [`CachedEmbedder`].
#[derive(Debug)]
pub struct AsyncCachedEmbedder<P> {
    inner: P,
    cache: Arc<TieredCache<Vec<f32>>>,
    retry: AsyncRetryPolicy<HalberdError>,
}

impl<P: AsyncEmbeddingProvider> AsyncCachedEmbedder<P> {
    pub fn new(inner: P, cache: Arc<TieredCache<Vec<f32>>>) -> Self {
        warn_on_model_mismatch(inner.model_id(), &cache);
        AsyncCachedEmbedder {
            inner,
            cache,
            retry: AsyncRetryPolicy::<HalberdError>::transient(RetryConfig::embedding_service()),
        }
    }

    pub fn from_registry(inner: P, registry: &CacheRegistry<Vec<f32>>) -> Result<Self> {
        let cache = registry.get_or_create(inner.model_id())?;
        Ok(Self::new(inner, cache))
    }

    pub fn with_retry(mut self, retry: AsyncRetryPolicy<HalberdError>) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &Arc<TieredCache<Vec<f32>>> {
        &self.cache
    }
}

impl<P> AsyncCachedEmbedder<P> {
    /// Cache lookups touch the disk tier, so they run on the blocking pool.
    async fn cached_many(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let cache = Arc::clone(&self.cache);
        let owned = texts.to_vec();
        match tokio::task::spawn_blocking(move || cache.get_many(&owned)).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(
                    event = "embedding.cached.lookup_failed",
                    error = %e,
                    "cache lookup task failed, treating as misses"
                );
                vec![None; texts.len()]
            }
        }
    }

    async fn store_many(&self, items: Vec<(String, Vec<f32>)>) {
        let cache = Arc::clone(&self.cache);
        if let Err(e) = tokio::task::spawn_blocking(move || cache.set_many(items)).await {
            tracing::warn!(
                event = "embedding.cached.store_failed",
                error = %e,
                "cache store task failed"
            );
        }
    }
}

#[async_trait]
impl<P: AsyncEmbeddingProvider> AsyncEmbeddingProvider for AsyncCachedEmbedder<P> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(Some(vector)) = self.cached_many(&[text.to_string()]).await.pop() {
            return Ok(vector);
        }
        let vector = self.retry.call(|| self.inner.embed(text)).await?;
        self.store_many(vec![(text.to_string(), vector.clone())]).await;
        Ok(vector)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let cached = self.cached_many(texts).await;
        let (missing_idx, missing): (Vec<usize>, Vec<String>) = cached
            .iter()
            .enumerate()
            .filter(|(_, hit)| hit.is_none())
            .map(|(i, _)| (i, texts[i].clone()))
            .unzip();

        let fresh = if missing.is_empty() {
            Vec::new()
        } else {
            let fresh = self.retry.call(|| self.inner.embed_many(&missing)).await?;
            check_batch_len(missing.len(), fresh.len())?;
            self.store_many(missing.into_iter().zip(fresh.iter().cloned()).collect()).await;
            fresh
        };

        Ok(merge_batch(cached, &missing_idx, fresh))
    }
}

fn warn_on_model_mismatch(model_id: &str, cache: &TieredCache<Vec<f32>>) {
    if cache.model() != model_id {
        tracing::warn!(
            event = "embedding.cached.model_mismatch",
            provider_model = model_id,
            cache_model = cache.model(),
            "cache is versioned by a different model than the provider"
        );
    }
}

fn check_batch_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(HalberdError::embedding(format!(
            "provider returned {actual} vectors for {expected} texts"
        )));
    }
    Ok(())
}

fn merge_batch(
    cached: Vec<Option<Vec<f32>>>,
    missing_idx: &[usize],
    fresh: Vec<Vec<f32>>,
) -> Vec<Vec<f32>> {
    let mut slots = cached;
    for (&i, vector) in missing_idx.iter().zip(fresh) {
        slots[i] = Some(vector);
    }
    slots.into_iter().map(Option::unwrap_or_default).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use super::*;
    use crate::cache::CacheConfig;

    #[derive(Debug, Default)]
    struct Counting {
        single: AtomicUsize,
        batched: AtomicUsize,
        failures_left: AtomicUsize,
    }

    impl EmbeddingProvider for Counting {
        fn model_id(&self) -> &str {
            "counting"
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(HalberdError::embedding("temporarily unavailable"));
            }
            self.single.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32])
        }

        fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batched.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    fn cache(dir: &TempDir) -> Arc<TieredCache<Vec<f32>>> {
        let mut config = CacheConfig::default();
        config.l2.directory = dir.path().to_path_buf();
        Arc::new(TieredCache::from_config(&config, "counting").unwrap())
    }

    #[test]
    fn test_second_call_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let embedder = CachedEmbedder::new(Counting::default(), cache(&dir));

        assert_eq!(embedder.embed("abc").unwrap(), vec![3.0]);
        assert_eq!(embedder.embed("abc").unwrap(), vec![3.0]);
        assert_eq!(embedder.inner().single.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_embed_many_sends_only_misses() {
        let dir = TempDir::new().unwrap();
        let embedder = CachedEmbedder::new(Counting::default(), cache(&dir));
        embedder.embed("a").unwrap();

        let texts = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        let vectors = embedder.embed_many(&texts).unwrap();

        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
        assert_eq!(embedder.inner().batched.load(Ordering::SeqCst), 2);

        embedder.embed_many(&texts).unwrap();
        assert_eq!(embedder.inner().batched.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transient_failures_retried() {
        let dir = TempDir::new().unwrap();
        let provider = Counting {
            failures_left: AtomicUsize::new(2),
            ..Counting::default()
        };
        let embedder = CachedEmbedder::new(provider, cache(&dir))
            .with_retry(RetryPolicy::<HalberdError>::transient(RetryConfig::immediate(3)));

        assert_eq!(embedder.embed("four").unwrap(), vec![4.0]);
        assert_eq!(embedder.inner().single.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_merge_batch_keeps_order() {
        let merged = merge_batch(vec![Some(vec![1.0]), None, Some(vec![3.0]), None], &[1, 3], vec![vec![2.0], vec![4.0]]);
        assert_eq!(merged, vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
    }

    #[tokio::test]
    async fn test_async_cached_embedder() {
        let dir = TempDir::new().unwrap();
        let mut config = CacheConfig::default();
        config.l2.directory = dir.path().to_path_buf();
        let registry = CacheRegistry::new(config);
        let provider = crate::embedding::hashing::HashingEmbedder::new(8).unwrap();
        let embedder = AsyncCachedEmbedder::from_registry(provider, &registry).unwrap();

        let first = AsyncEmbeddingProvider::embed(&embedder, "prazo").await.unwrap();
        let second = AsyncEmbeddingProvider::embed(&embedder, "prazo").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(embedder.cache().stats().l1.hits, 1);
        assert_eq!(registry.models(), vec!["hashing-8".to_string()]);

        let texts = vec!["prazo".to_string(), "multa".to_string()];
        let batch = AsyncEmbeddingProvider::embed_many(&embedder, &texts).await.unwrap();
        assert_eq!(batch[0], first);
        assert_eq!(embedder.cache().stats().l1.hits, 2);
        assert!(embedder.cache().l2().exists(&embedder.cache().key_for("multa")));
    }
}
