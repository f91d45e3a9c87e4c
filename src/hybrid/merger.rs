//! Reciprocal Rank Fusion of a semantic and a keyword ranked list.

use std::cmp::Ordering;

use ahash::AHashMap;

use crate::document::Document;
use crate::error::Result;
use crate::hybrid::FusionResult;
use crate::hybrid::config::{DistancePolicy, HybridSearchConfig};
use crate::hybrid::corpus::IndexedCorpus;
use crate::hybrid::searcher::SemanticHit;
use crate::lexical::KeywordHit;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CandidateKey {
    Ordinal(usize),
    Unresolved(String),
}

#[derive(Debug)]
struct Candidate {
    ordinal: Option<usize>,
    document: Document,
    semantic_score: f64,
    keyword_score: f64,
    semantic_rank: Option<usize>,
    keyword_rank: Option<usize>,
}

/// Merges the two ranked lists of one query into [`FusionResult`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfMerger {
    alpha: f64,
    rrf_k: u32,
    distance_policy: DistancePolicy,
}

impl RrfMerger {
    pub fn new(config: &HybridSearchConfig) -> Self {
        RrfMerger {
            alpha: config.alpha,
            rrf_k: config.rrf_k,
            distance_policy: config.distance_policy,
        }
    }

    /// RRF contribution of a 1-based rank.
    pub fn rrf_score(&self, rank: usize) -> f64 {
        1.0 / (f64::from(self.rrf_k) + rank as f64)
    }

    /// Fused score of a document with the given ranks (absent ranks contribute 0).
    pub fn fused_score(&self, semantic_rank: Option<usize>, keyword_rank: Option<usize>) -> f64 {
        let semantic = semantic_rank.map_or(0.0, |rank| self.rrf_score(rank));
        let keyword = keyword_rank.map_or(0.0, |rank| self.rrf_score(rank));
        self.alpha * semantic + (1.0 - self.alpha) * keyword
    }

    /// Fuse `semantic` and `keyword` (both best first) and keep the top `k`.
    ///
    /// A document listed twice in one source list keeps its first rank.
    /// Semantic hits that resolve to no indexed document are kept with
    /// `ordinal: None`. Results are ordered by fused score, then ordinal,
    /// with unresolved hits after resolved ones on ties.
    pub fn merge(
        &self,
        corpus: &IndexedCorpus,
        semantic: Vec<SemanticHit>,
        keyword: &[KeywordHit],
        k: usize,
    ) -> Result<Vec<FusionResult>> {
        let semantic_len = semantic.len();
        let mut slots: AHashMap<CandidateKey, usize> = AHashMap::new();
        let mut candidates: Vec<Candidate> = Vec::with_capacity(semantic_len + keyword.len());

        for (position, hit) in semantic.into_iter().enumerate() {
            let distance = self.distance_policy.apply(hit.distance)?;
            let ordinal = corpus.resolve(&hit.document);
            let key = match ordinal {
                Some(ordinal) => CandidateKey::Ordinal(ordinal),
                None => {
                    tracing::warn!(
                        event = "hybrid.merge.unresolved_semantic_hit",
                        semantic_rank = position + 1,
                        content_len = hit.document.content.len(),
                        "semantic hit matches no indexed document"
                    );
                    CandidateKey::Unresolved(hit.document.content.clone())
                }
            };
            if slots.contains_key(&key) {
                continue;
            }
            let document = match ordinal.and_then(|o| corpus.document(o)) {
                Some(indexed) => indexed.clone(),
                None => hit.document,
            };
            slots.insert(key, candidates.len());
            candidates.push(Candidate {
                ordinal,
                document,
                semantic_score: 1.0 - distance,
                keyword_score: 0.0,
                semantic_rank: Some(position + 1),
                keyword_rank: None,
            });
        }

        for (position, hit) in keyword.iter().enumerate() {
            let Some(document) = corpus.document(hit.ordinal) else {
                continue;
            };
            let key = CandidateKey::Ordinal(hit.ordinal);
            match slots.get(&key) {
                Some(&slot) => {
                    let candidate = &mut candidates[slot];
                    if candidate.keyword_rank.is_none() {
                        candidate.keyword_score = hit.score;
                        candidate.keyword_rank = Some(position + 1);
                    }
                }
                None => {
                    slots.insert(key, candidates.len());
                    candidates.push(Candidate {
                        ordinal: Some(hit.ordinal),
                        document: document.clone(),
                        semantic_score: 0.0,
                        keyword_score: hit.score,
                        semantic_rank: None,
                        keyword_rank: Some(position + 1),
                    });
                }
            }
        }

        let mut results: Vec<FusionResult> = candidates
            .into_iter()
            .map(|c| FusionResult {
                fused_score: self.fused_score(c.semantic_rank, c.keyword_rank),
                ordinal: c.ordinal,
                document: c.document,
                semantic_score: c.semantic_score,
                keyword_score: c.keyword_score,
                semantic_rank: c.semantic_rank,
                keyword_rank: c.keyword_rank,
                rank: 0,
            })
            .collect();

        results.sort_by(compare_results);
        results.truncate(k);
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }

        tracing::debug!(
            event = "hybrid.merge.completed",
            semantic_results = semantic_len,
            keyword_results = keyword.len(),
            fused_results = results.len(),
            "ranked lists fused"
        );
        Ok(results)
    }
}

fn compare_results(a: &FusionResult, b: &FusionResult) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| match (a.ordinal, b.ordinal) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.semantic_rank.cmp(&b.semantic_rank),
        })
}
