//! Hybrid search engines.
//!
//! [`HybridEngine`] queries the semantic searcher and the keyword index one
//! after the other on the calling thread. [`AsyncHybridEngine`] runs the BM25
//! search on tokio's blocking pool concurrently with the async semantic search.
//! Both fuse with the same [`RrfMerger`].

use std::sync::Arc;

use parking_lot::RwLock;

use crate::analysis::analyzer::{Analyzer, KeywordAnalyzer};
use crate::document::Document;
use crate::error::{HalberdError, Result};
use crate::hybrid::FusionResult;
use crate::hybrid::config::HybridSearchConfig;
use crate::hybrid::corpus::IndexedCorpus;
use crate::hybrid::merger::RrfMerger;
use crate::hybrid::searcher::{AsyncSemanticSearcher, SemanticSearcher};
use crate::lexical::bm25::{Bm25Config, Bm25Index};
use crate::metrics::{HYBRID_SEARCH_DURATION, HYBRID_SEARCH_TOTAL, MetricsCollector, Timer};

/// Index state shared by both engines.
#[derive(Debug)]
struct Generations {
    config: HybridSearchConfig,
    bm25: Bm25Config,
    analyzer: Arc<dyn Analyzer>,
    current: RwLock<Option<Arc<IndexedCorpus>>>,
    metrics: Arc<MetricsCollector>,
}

impl Generations {
    fn new(config: HybridSearchConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            event = "hybrid.engine.created",
            alpha = config.alpha,
            rrf_k = config.rrf_k,
            "hybrid engine created"
        );
        Ok(Generations {
            config,
            bm25: Bm25Config::default(),
            analyzer: Arc::new(KeywordAnalyzer::new()?),
            current: RwLock::new(None),
            metrics: MetricsCollector::shared(),
        })
    }

    fn snapshot(&self) -> Option<Arc<IndexedCorpus>> {
        self.current.read().clone()
    }

    /// Count a search that reached the ranking stage.
    fn record_search(&self, timer: Timer) {
        self.metrics.increment(HYBRID_SEARCH_TOTAL, &[]);
        self.metrics.record_time(HYBRID_SEARCH_DURATION, &[], timer.stop());
    }

    fn publish(&self, documents: Vec<Document>) -> Arc<IndexedCorpus> {
        let keyword = Arc::new(Bm25Index::build(&documents, self.bm25, Arc::clone(&self.analyzer)));
        let stats = keyword.stats();
        let corpus = Arc::new(IndexedCorpus::new(documents, keyword));
        *self.current.write() = Some(Arc::clone(&corpus));

        tracing::info!(
            event = "hybrid.indexed",
            corpus_size = stats.corpus_size,
            vocabulary_size = stats.vocabulary_size,
            avg_doc_length = stats.avg_doc_length,
            "documents indexed for hybrid search"
        );
        corpus
    }

    /// The current generation, or `None` when a search has nothing to rank.
    fn searchable(&self, k: usize) -> Option<Arc<IndexedCorpus>> {
        let corpus = self.snapshot();
        match corpus {
            Some(corpus) if !corpus.is_empty() && k > 0 => Some(corpus),
            Some(_) => None,
            None => {
                tracing::warn!(event = "hybrid.search.not_indexed", "no documents indexed for hybrid search");
                None
            }
        }
    }
}

/// Blocking hybrid engine.
///
/// # Examples
///
/// ```
/// use halberd::document::Document;
/// use halberd::error::Result;
/// use halberd::hybrid::{HybridEngine, HybridSearchConfig, SemanticHit, SemanticSearcher};
///
/// struct NoSemantic;
///
/// impl SemanticSearcher for NoSemantic {
///     fn search_with_score(&self, _query: &str, _k: usize) -> Result<Vec<SemanticHit>> {
///         Ok(Vec::new())
///     }
/// }
///
/// # fn main() -> Result<()> {
/// let engine = HybridEngine::new(NoSemantic, HybridSearchConfig::default())?;
/// engine.index(vec![Document::new("multa por atraso de pagamento")]);
///
/// let results = engine.search("multa atraso", 5, 10, 10)?;
/// assert_eq!(results[0].rank, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HybridEngine<S> {
    searcher: S,
    state: Generations,
}

impl<S: SemanticSearcher> HybridEngine<S> {
    /// Create an engine around `searcher`. Fails if `config` is invalid.
    pub fn new(searcher: S, config: HybridSearchConfig) -> Result<Self> {
        Ok(HybridEngine {
            searcher,
            state: Generations::new(config)?,
        })
    }

    /// Use `analyzer` and `bm25` for subsequent `index` calls.
    pub fn with_keyword_settings(mut self, bm25: Bm25Config, analyzer: Arc<dyn Analyzer>) -> Self {
        self.state.bm25 = bm25;
        self.state.analyzer = analyzer;
        self
    }

    /// Count searches and their latency in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.state.metrics = metrics;
        self
    }

    pub fn config(&self) -> &HybridSearchConfig {
        &self.state.config
    }

    pub fn searcher(&self) -> &S {
        &self.searcher
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.state.metrics
    }

    /// Replace the indexed collection and its keyword index in one step.
    ///
    /// Ordinals in earlier results refer to the previous collection.
    pub fn index(&self, documents: Vec<Document>) {
        self.state.publish(documents);
    }

    /// The currently indexed collection.
    pub fn documents(&self) -> Option<Arc<IndexedCorpus>> {
        self.state.snapshot()
    }

    pub fn is_indexed(&self) -> bool {
        self.state.snapshot().is_some()
    }

    /// Up to `k` fused results for `query`.
    ///
    /// Returns an empty list before the first `index` call. Errors from the
    /// semantic searcher are returned unchanged.
    pub fn search(&self, query: &str, k: usize, semantic_k: usize, keyword_k: usize) -> Result<Vec<FusionResult>> {
        let Some(corpus) = self.state.searchable(k) else {
            return Ok(Vec::new());
        };
        tracing::debug!(event = "hybrid.search.started", query_len = query.len(), k, "hybrid search");
        let timer = Timer::start();

        let semantic = self.searcher.search_with_score(query, semantic_k)?;
        let keyword = corpus.keyword_index().search(query, keyword_k);
        let results = RrfMerger::new(&self.state.config).merge(&corpus, semantic, &keyword, k)?;
        self.state.record_search(timer);
        Ok(results)
    }

    /// [`search`](Self::search) with the configured `default_k`, `semantic_k` and `keyword_k`.
    pub fn search_default(&self, query: &str) -> Result<Vec<FusionResult>> {
        let config = &self.state.config;
        self.search(query, config.default_k, config.semantic_k, config.keyword_k)
    }
}

/// Async hybrid engine.
#[derive(Debug)]
pub struct AsyncHybridEngine<S> {
    searcher: S,
    state: Generations,
}

impl<S: AsyncSemanticSearcher> AsyncHybridEngine<S> {
    /// Create an engine around `searcher`. Fails if `config` is invalid.
    pub fn new(searcher: S, config: HybridSearchConfig) -> Result<Self> {
        Ok(AsyncHybridEngine {
            searcher,
            state: Generations::new(config)?,
        })
    }

    /// Use `analyzer` and `bm25` for subsequent `index` calls.
    pub fn with_keyword_settings(mut self, bm25: Bm25Config, analyzer: Arc<dyn Analyzer>) -> Self {
        self.state.bm25 = bm25;
        self.state.analyzer = analyzer;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.state.metrics = metrics;
        self
    }

    pub fn config(&self) -> &HybridSearchConfig {
        &self.state.config
    }

    pub fn searcher(&self) -> &S {
        &self.searcher
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.state.metrics
    }

    /// Replace the indexed collection and its keyword index in one step.
    pub fn index(&self, documents: Vec<Document>) {
        self.state.publish(documents);
    }

    pub fn documents(&self) -> Option<Arc<IndexedCorpus>> {
        self.state.snapshot()
    }

    pub fn is_indexed(&self) -> bool {
        self.state.snapshot().is_some()
    }

    /// Up to `k` fused results for `query`; both lists are fetched concurrently.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        semantic_k: usize,
        keyword_k: usize,
    ) -> Result<Vec<FusionResult>> {
        let Some(corpus) = self.state.searchable(k) else {
            return Ok(Vec::new());
        };
        tracing::debug!(event = "hybrid.search.started", query_len = query.len(), k, "async hybrid search");
        let timer = Timer::start();

        let index = Arc::clone(corpus.keyword_index());
        let keyword_query = query.to_string();
        let keyword_task = tokio::task::spawn_blocking(move || index.search(&keyword_query, keyword_k));

        let (semantic, keyword) = tokio::join!(self.searcher.search_with_score(query, semantic_k), keyword_task);
        let semantic = semantic?;
        let keyword = keyword.map_err(|e| HalberdError::other(format!("keyword search task failed: {e}")))?;

        let results = RrfMerger::new(&self.state.config).merge(&corpus, semantic, &keyword, k)?;
        self.state.record_search(timer);
        Ok(results)
    }

    pub async fn search_default(&self, query: &str) -> Result<Vec<FusionResult>> {
        let config = &self.state.config;
        self.search(query, config.default_k, config.semantic_k, config.keyword_k).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::hybrid::searcher::SemanticHit;

    /// Returns fixed hits and counts calls.
    #[derive(Debug, Default)]
    struct Fixed {
        hits: Vec<SemanticHit>,
        calls: AtomicUsize,
    }

    impl SemanticSearcher for Fixed {
        fn search_with_score(&self, _query: &str, k: usize) -> Result<Vec<SemanticHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.iter().take(k).cloned().collect())
        }
    }

    #[async_trait]
    impl AsyncSemanticSearcher for Fixed {
        async fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>> {
            SemanticSearcher::search_with_score(self, query, k)
        }
    }

    struct Failing;

    impl SemanticSearcher for Failing {
        fn search_with_score(&self, _query: &str, _k: usize) -> Result<Vec<SemanticHit>> {
            Err(HalberdError::vector_store("connection refused"))
        }
    }

    fn documents() -> Vec<Document> {
        vec![
            Document::new("taxa de juros anual"),
            Document::new("prazo de pagamento"),
            Document::new("multa por atraso"),
        ]
    }

    #[test]
    fn test_search_before_index_is_empty() {
        let engine = HybridEngine::new(Fixed::default(), HybridSearchConfig::default()).unwrap();
        assert!(!engine.is_indexed());
        assert!(engine.search("juros", 5, 10, 10).unwrap().is_empty());
        assert_eq!(engine.searcher().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HybridSearchConfig {
            alpha: 2.0,
            ..HybridSearchConfig::default()
        };
        assert!(HybridEngine::new(Fixed::default(), config).is_err());
    }

    #[test]
    fn test_fuses_both_lists() {
        let searcher = Fixed {
            hits: vec![SemanticHit::new(Document::new("multa por atraso"), 0.2)],
            ..Fixed::default()
        };
        let engine = HybridEngine::new(searcher, HybridSearchConfig::default()).unwrap();
        engine.index(documents());

        let results = engine.search("juros", 5, 10, 10).unwrap();
        let ordinals: Vec<_> = results.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![Some(0), Some(2)]);
        assert_eq!(results[1].semantic_rank, Some(1));
        assert_eq!(results[0].keyword_rank, Some(1));
    }

    #[test]
    fn test_semantic_error_propagates() {
        let engine = HybridEngine::new(Failing, HybridSearchConfig::default()).unwrap();
        engine.index(documents());
        let err = engine.search("juros", 5, 10, 10).unwrap_err();
        assert!(matches!(err, HalberdError::VectorStore(_)));
    }

    #[test]
    fn test_search_counter() {
        let metrics = MetricsCollector::shared();
        let engine = HybridEngine::new(Fixed::default(), HybridSearchConfig::default())
            .unwrap()
            .with_metrics(Arc::clone(&metrics));

        engine.search("juros", 5, 10, 10).unwrap();
        assert_eq!(metrics.counter(HYBRID_SEARCH_TOTAL, &[]), 0, "nothing indexed yet");

        engine.index(documents());
        engine.search("juros", 5, 10, 10).unwrap();
        engine.search_default("prazo").unwrap();
        engine.search("juros", 0, 10, 10).unwrap();

        assert_eq!(metrics.counter(HYBRID_SEARCH_TOTAL, &[]), 2);
        assert_eq!(metrics.timer_stats(HYBRID_SEARCH_DURATION, &[]).unwrap().count, 2);
    }

    #[test]
    fn test_reindex_replaces_collection() {
        let engine = HybridEngine::new(Fixed::default(), HybridSearchConfig::default()).unwrap();
        engine.index(documents());
        engine.index(vec![Document::new("juros compostos")]);

        let results = engine.search_default("juros").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.content, "juros compostos");
        assert_eq!(engine.documents().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_async_engine_matches_sync() {
        let hits = vec![
            SemanticHit::new(Document::new("prazo de pagamento"), 0.1),
            SemanticHit::new(Document::new("taxa de juros anual"), 0.4),
        ];
        let sync_engine = HybridEngine::new(
            Fixed {
                hits: hits.clone(),
                ..Fixed::default()
            },
            HybridSearchConfig::default(),
        )
        .unwrap();
        let async_engine = AsyncHybridEngine::new(
            Fixed {
                hits,
                ..Fixed::default()
            },
            HybridSearchConfig::default(),
        )
        .unwrap();
        sync_engine.index(documents());
        async_engine.index(documents());

        let expected = sync_engine.search("juros pagamento", 3, 10, 10).unwrap();
        let actual = async_engine.search("juros pagamento", 3, 10, 10).await.unwrap();
        assert_eq!(expected, actual);
        assert_eq!(async_engine.metrics().counter(HYBRID_SEARCH_TOTAL, &[]), 1);
    }
}
