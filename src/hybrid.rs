//! Hybrid retrieval: BM25 keyword ranking fused with semantic similarity
//! ranking by Reciprocal Rank Fusion (RRF).
//!
//! For each document appearing in either ranked list the fused score is
//!
//! ```text
//! alpha / (rrf_k + rank_semantic) + (1 - alpha) / (rrf_k + rank_keyword)
//! ```
//!
//! where a list the document is absent from contributes zero. Only ranks
//! enter the formula, so BM25 scores and distances never need to be put on a
//! common scale.

pub mod config;
pub mod corpus;
pub mod engine;
pub mod merger;
pub mod searcher;

use serde::{Deserialize, Serialize};

use crate::document::Document;

pub use crate::hybrid::config::{DistancePolicy, HybridSearchConfig};
pub use crate::hybrid::engine::{AsyncHybridEngine, HybridEngine};
pub use crate::hybrid::merger::RrfMerger;
pub use crate::hybrid::searcher::{AsyncSemanticSearcher, SemanticHit, SemanticSearcher};

/// One fused result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    /// Position in the indexed collection; `None` for a semantic hit that
    /// matched no indexed document.
    pub ordinal: Option<usize>,
    pub document: Document,
    /// `1 - distance`, or 0.0 when absent from the semantic list.
    pub semantic_score: f64,
    /// BM25 score, or 0.0 when absent from the keyword list.
    pub keyword_score: f64,
    /// 1-based position in the semantic list.
    pub semantic_rank: Option<usize>,
    /// 1-based position in the keyword list.
    pub keyword_rank: Option<usize>,
    pub fused_score: f64,
    /// 1-based final position.
    pub rank: usize,
}
