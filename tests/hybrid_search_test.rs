//! Integration tests for hybrid (keyword + semantic) search.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use halberd::document::Document;
use halberd::embedding::hashing::HashingEmbedder;
use halberd::error::{HalberdError, Result};
use halberd::hybrid::{
    AsyncHybridEngine, AsyncSemanticSearcher, HybridEngine, HybridSearchConfig, SemanticHit, SemanticSearcher,
};
use halberd::vector::store::FlatVectorStore;

fn contract() -> Vec<Document> {
    vec![
        Document::new("Contrato de mútuo com taxa de juros de 5%.").with_id("c#0"),
        Document::new("Garantia hipotecária sobre o imóvel.").with_id("c#1"),
        Document::new("Prazo de 36 meses para pagamento.").with_id("c#2"),
        Document::new("Multa de 2% por atraso no pagamento.").with_id("c#3"),
    ]
}

/// Semantic searcher returning a scripted ranking.
#[derive(Default)]
struct Scripted {
    ranking: Vec<(Document, f64)>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(ranking: Vec<(Document, f64)>) -> Self {
        Scripted {
            ranking,
            calls: AtomicUsize::new(0),
        }
    }
}

impl SemanticSearcher for Scripted {
    fn search_with_score(&self, _query: &str, k: usize) -> Result<Vec<SemanticHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .ranking
            .iter()
            .take(k)
            .map(|(doc, distance)| SemanticHit::new(doc.clone(), *distance))
            .collect())
    }
}

#[async_trait]
impl AsyncSemanticSearcher for Scripted {
    async fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>> {
        SemanticSearcher::search_with_score(self, query, k)
    }
}

fn config(alpha: f64) -> HybridSearchConfig {
    HybridSearchConfig {
        alpha,
        ..HybridSearchConfig::default()
    }
}

#[test]
fn test_search_before_index_returns_empty() -> Result<()> {
    let engine = HybridEngine::new(Scripted::default(), HybridSearchConfig::default())?;
    assert!(engine.search("juros", 5, 10, 10)?.is_empty());
    assert_eq!(engine.searcher().calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_document_in_both_lists_outranks_single_list_leaders() -> Result<()> {
    let docs = contract();
    // Semantic: c#3 first, c#0 second. Keyword for "juros" ranks c#0 first.
    let searcher = Scripted::new(vec![(docs[3].clone(), 0.1), (docs[0].clone(), 0.2)]);

    for alpha in [0.1, 0.5, 0.9] {
        let engine = HybridEngine::new(Scripted::new(searcher.ranking.clone()), config(alpha))?;
        engine.index(docs.clone());

        let results = engine.search("juros", 5, 10, 10)?;
        assert_eq!(results[0].document.id.as_ref().map(|id| id.as_str()), Some("c#0"), "alpha {alpha}");
        assert_eq!(results[0].rank, 1);
        assert!(results[0].semantic_rank.is_some() && results[0].keyword_rank.is_some());
    }
    Ok(())
}

#[test]
fn test_both_lists_rank_one_beats_single_rank_one() -> Result<()> {
    let docs = contract();
    let searcher = Scripted::new(vec![(docs[0].clone(), 0.1), (docs[2].clone(), 0.2)]);
    let engine = HybridEngine::new(searcher, config(0.3))?;
    engine.index(docs);

    let results = engine.search("juros", 5, 10, 10)?;
    assert_eq!(results[0].ordinal, Some(0));
    assert!(results[0].fused_score > results[1].fused_score);
    Ok(())
}

#[test]
fn test_alpha_extremes_reduce_to_single_ranking() -> Result<()> {
    let docs = contract();
    let semantic = vec![(docs[2].clone(), 0.1), (docs[1].clone(), 0.3)];

    let semantic_only = HybridEngine::new(Scripted::new(semantic.clone()), config(1.0))?;
    semantic_only.index(docs.clone());
    let results = semantic_only.search("pagamento", 2, 10, 10)?;
    let ordinals: Vec<_> = results.iter().map(|r| r.ordinal).collect();
    assert_eq!(ordinals, vec![Some(2), Some(1)]);

    let keyword_only = HybridEngine::new(Scripted::new(semantic), config(0.0))?;
    keyword_only.index(docs.clone());
    let results = keyword_only.search("multa atraso", 1, 10, 10)?;
    assert_eq!(results[0].ordinal, Some(3));
    Ok(())
}

#[test]
fn test_results_truncated_and_ranked() -> Result<()> {
    let docs = contract();
    let ranking = docs.iter().rev().map(|d| (d.clone(), 0.4)).collect();
    let engine = HybridEngine::new(Scripted::new(ranking), HybridSearchConfig::default())?;
    engine.index(docs);

    let results = engine.search("pagamento", 3, 10, 10)?;
    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(results.windows(2).all(|w| w[0].fused_score >= w[1].fused_score));
    Ok(())
}

#[test]
fn test_semantic_hits_resolved_by_id() -> Result<()> {
    let docs = contract();
    // The vector store returned a re-chunked text, but kept the id.
    let rewritten = Document::new("multa de dois por cento").with_id("c#3");
    let engine = HybridEngine::new(Scripted::new(vec![(rewritten, 0.05)]), HybridSearchConfig::default())?;
    engine.index(docs);

    let results = engine.search("garantia", 5, 10, 10)?;
    let semantic = results.iter().find(|r| r.semantic_rank == Some(1)).expect("semantic hit");
    assert_eq!(semantic.ordinal, Some(3));
    assert_eq!(semantic.document.content, "Multa de 2% por atraso no pagamento.");
    Ok(())
}

#[test]
fn test_semantic_failure_propagates() -> Result<()> {
    struct Down;
    impl SemanticSearcher for Down {
        fn search_with_score(&self, _query: &str, _k: usize) -> Result<Vec<SemanticHit>> {
            Err(HalberdError::timeout("vector store did not answer"))
        }
    }

    let engine = HybridEngine::new(Down, HybridSearchConfig::default())?;
    engine.index(contract());
    assert!(matches!(engine.search("juros", 5, 10, 10), Err(HalberdError::Timeout(_))));
    Ok(())
}

#[test]
fn test_with_flat_vector_store() -> Result<()> {
    let docs = contract();
    let store = FlatVectorStore::new(HashingEmbedder::new(256)?);
    store.add_documents(&docs)?;
    let engine = HybridEngine::new(store, HybridSearchConfig::default())?;
    engine.index(docs);

    let results = engine.search_default("multa por atraso no pagamento")?;
    assert_eq!(results[0].ordinal, Some(3));
    assert_eq!(results[0].semantic_rank, Some(1));
    assert_eq!(results[0].keyword_rank, Some(1));
    assert!(results.len() <= HybridSearchConfig::default().default_k);
    Ok(())
}

#[tokio::test]
async fn test_async_engine() -> Result<()> {
    let docs = contract();
    let engine = AsyncHybridEngine::new(
        Scripted::new(vec![(docs[0].clone(), 0.1)]),
        HybridSearchConfig::default(),
    )?;
    assert!(engine.search("juros", 5, 10, 10).await?.is_empty());

    engine.index(docs);
    let results = engine.search_default("juros").await?;
    assert_eq!(results[0].ordinal, Some(0));
    assert_eq!(results[0].keyword_rank, Some(1));
    assert_eq!(results[0].semantic_rank, Some(1));
    Ok(())
}
