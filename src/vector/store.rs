//! Exact in-memory semantic search over an embedding provider.

use std::cmp::Ordering;

use parking_lot::RwLock;
use rayon::prelude::*;

use crate::document::Document;
use crate::embedding::provider::EmbeddingProvider;
use crate::error::{HalberdError, Result};
use crate::hybrid::searcher::{SemanticHit, SemanticSearcher};
use crate::resilience::retry::RetryPolicy;
use crate::vector::distance::cosine_distance;

#[derive(Debug, Clone)]
struct StoredVector {
    document: Document,
    vector: Vec<f32>,
}

/// Brute-force cosine search over every stored document.
///
/// The query is embedded once through the embedder, which owns any retry or
/// caching of its own; [`with_retry`](Self::with_retry) guards only the
/// similarity scan, so the two policies never nest.
#[derive(Debug)]
pub struct FlatVectorStore<E> {
    embedder: E,
    entries: RwLock<Vec<StoredVector>>,
    retry: Option<RetryPolicy<HalberdError>>,
}

impl<E: EmbeddingProvider> FlatVectorStore<E> {
    pub fn new(embedder: E) -> Self {
        FlatVectorStore {
            embedder,
            entries: RwLock::new(Vec::new()),
            retry: None,
        }
    }

    /// Run the similarity scan under `retry` and its breaker.
    pub fn with_retry(mut self, retry: RetryPolicy<HalberdError>) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Embed and store `documents`. Returns how many were added.
    pub fn add_documents(&self, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_many(&texts)?;
        if vectors.len() != documents.len() {
            return Err(HalberdError::vector_store(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }

        let mut entries = self.entries.write();
        entries.extend(
            documents
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(document, vector)| StoredVector { document, vector }),
        );
        tracing::debug!(
            event = "vector.store.added",
            added = documents.len(),
            total = entries.len(),
            model = self.embedder.model_id(),
            "documents embedded"
        );
        Ok(documents.len())
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// The `k` stored documents nearest to `query_vector`.
    fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<SemanticHit>> {
        let entries = self.entries.read();
        if let Some(entry) = entries.iter().find(|entry| entry.vector.len() != query_vector.len()) {
            return Err(HalberdError::invalid_argument(format!(
                "query vector has dimension {} but stored vectors have {}",
                query_vector.len(),
                entry.vector.len()
            )));
        }

        let mut scored: Vec<(usize, f64)> = entries
            .par_iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_distance(query_vector, &entry.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| SemanticHit::new(entries[i].document.clone(), distance))
            .collect())
    }
}

impl<E: EmbeddingProvider> SemanticSearcher for FlatVectorStore<E> {
    /// Nearest `k` documents by cosine distance, ties in insertion order.
    fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query)?;

        match &self.retry {
            Some(retry) => retry.call(|| self.nearest(&query_vector, k)),
            None => self.nearest(&query_vector, k),
        }
    }
}
