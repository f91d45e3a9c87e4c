//! Lexical (keyword) search with BM25 scoring.
//!
//! - [`bm25`]: the immutable scored index built from one document collection
//! - [`index`]: [`index::KeywordIndex`], a shareable handle that rebuilds the
//!   index with `fit` and swaps it in atomically so concurrent searches never
//!   observe a half-built index

pub mod bm25;
pub mod index;

use serde::{Deserialize, Serialize};

/// A single keyword search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeywordHit {
    /// Position of the document in the collection passed to `fit`.
    pub ordinal: usize,
    /// BM25 score, always strictly positive.
    pub score: f64,
}

impl KeywordHit {
    /// Create a new hit.
    pub fn new(ordinal: usize, score: f64) -> Self {
        KeywordHit { ordinal, score }
    }
}
