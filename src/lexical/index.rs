//! Shareable keyword index with atomic rebuilds.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::analysis::analyzer::{Analyzer, KeywordAnalyzer};
use crate::document::Document;
use crate::error::Result;
use crate::lexical::KeywordHit;
use crate::lexical::bm25::{Bm25Config, Bm25Index, KeywordIndexStats};

/// A BM25 keyword index that can be re-fitted while other threads search.
///
/// `fit` builds a complete [`Bm25Index`] outside any lock and then swaps the
/// shared pointer, so a search sees either the previous index or the new one,
/// never a partially built one. Searches run in parallel with each other.
///
/// # Examples
///
/// ```
/// use halberd::document::Document;
/// use halberd::lexical::index::KeywordIndex;
///
/// # fn main() -> halberd::error::Result<()> {
/// let index = KeywordIndex::new()?;
/// index.fit(&[
///     Document::new("O contrato estabelece taxa de juros de 5% ao ano."),
///     Document::new("O prazo do contrato é de 36 meses."),
/// ]);
///
/// let hits = index.search("taxa de juros", 3);
/// assert_eq!(hits[0].ordinal, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct KeywordIndex {
    config: Bm25Config,
    analyzer: Arc<dyn Analyzer>,
    current: RwLock<Option<Arc<Bm25Index>>>,
}

impl KeywordIndex {
    /// Create an empty index with the default analyzer and BM25 parameters.
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(
            Bm25Config::default(),
            Arc::new(KeywordAnalyzer::new()?),
        ))
    }

    /// Create an empty index with explicit parameters and analyzer.
    pub fn with_config(config: Bm25Config, analyzer: Arc<dyn Analyzer>) -> Self {
        KeywordIndex {
            config,
            analyzer,
            current: RwLock::new(None),
        }
    }

    /// Get the scoring configuration.
    pub fn config(&self) -> &Bm25Config {
        &self.config
    }

    /// Replace the whole index with one built over `documents`.
    ///
    /// Previously returned ordinals are invalid after this call.
    pub fn fit(&self, documents: &[Document]) -> Arc<Bm25Index> {
        let index = Arc::new(Bm25Index::build(
            documents,
            self.config,
            Arc::clone(&self.analyzer),
        ));
        let stats = index.stats();
        *self.current.write() = Some(Arc::clone(&index));

        tracing::info!(
            event = "lexical.bm25.fitted",
            corpus_size = stats.corpus_size,
            vocabulary_size = stats.vocabulary_size,
            avg_doc_length = stats.avg_doc_length,
            "BM25 index fitted"
        );
        index
    }

    /// The currently published index, if `fit` has been called.
    pub fn snapshot(&self) -> Option<Arc<Bm25Index>> {
        self.current.read().clone()
    }

    /// Whether `fit` has been called.
    pub fn is_fitted(&self) -> bool {
        self.current.read().is_some()
    }

    /// Search the current index. Returns no hits before the first `fit`.
    pub fn search(&self, query: &str, k: usize) -> Vec<KeywordHit> {
        match self.snapshot() {
            Some(index) => index.search(query, k),
            None => Vec::new(),
        }
    }

    /// Inverse document frequency of `term` in the current index.
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.snapshot().and_then(|index| index.idf(term))
    }

    /// Statistics of the current index.
    pub fn stats(&self) -> Option<KeywordIndexStats> {
        self.snapshot().map(|index| index.stats())
    }
}
