//! The semantic search collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::Result;

/// One semantic search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    pub document: Document,
    /// Distance to the query, expected in `[0, 1]` with 0 meaning identical.
    pub distance: f64,
}

impl SemanticHit {
    pub fn new(document: Document, distance: f64) -> Self {
        SemanticHit { document, distance }
    }
}

/// Blocking similarity search returning up to `k` hits, nearest first.
pub trait SemanticSearcher: Send + Sync {
    fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>>;
}

/// Async similarity search returning up to `k` hits, nearest first.
#[async_trait]
pub trait AsyncSemanticSearcher: Send + Sync {
    async fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>>;
}

impl<S: SemanticSearcher + ?Sized> SemanticSearcher for Arc<S> {
    fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>> {
        (**self).search_with_score(query, k)
    }
}

#[async_trait]
impl<S: AsyncSemanticSearcher + ?Sized> AsyncSemanticSearcher for Arc<S> {
    async fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>> {
        (**self).search_with_score(query, k).await
    }
}
