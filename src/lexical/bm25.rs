//! BM25 scoring over an in-memory, immutable index.
//!
//! For each indexed term `t` the index precomputes
//!
//! ```text
//! idf(t) = ln((N - df(t) + 0.5) / (df(t) + 0.5) + 1)
//! ```
//!
//! and scores a document `d` against query terms `Q` as
//!
//! ```text
//! Σ_{t ∈ Q} idf(t) · tf(t,d)·(k1 + 1) / (tf(t,d) + k1·(1 - b + b·|d|/avgdl))
//! ```
//!
//! The `+ 1` inside the logarithm keeps every idf strictly positive, so any
//! document sharing at least one term with the query scores above zero.

use std::sync::Arc;

use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::analyzer::Analyzer;
use crate::document::Document;
use crate::error::{HalberdError, Result};
use crate::lexical::KeywordHit;

/// Configuration for BM25 scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Config {
    /// K1 parameter (term frequency saturation).
    pub k1: f64,

    /// B parameter (document length normalization).
    pub b: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Bm25Config { k1: 1.5, b: 0.75 }
    }
}

impl Bm25Config {
    /// Reject a negative or non-finite `k1` and a `b` outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(HalberdError::config("bm25.k1 must be a finite, non-negative number"));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(HalberdError::config("bm25.b must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Summary statistics of a fitted index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeywordIndexStats {
    /// Number of indexed documents.
    pub corpus_size: usize,
    /// Number of distinct indexed terms.
    pub vocabulary_size: usize,
    /// Average number of terms per document.
    pub avg_doc_length: f64,
}

/// An immutable BM25 index over one document collection.
#[derive(Debug)]
pub struct Bm25Index {
    config: Bm25Config,
    analyzer: Arc<dyn Analyzer>,
    /// Analyzed terms per document, in collection order.
    corpus: Vec<Vec<String>>,
    doc_lengths: Vec<usize>,
    term_freqs: Vec<AHashMap<String, u32>>,
    avg_doc_length: f64,
    doc_freqs: AHashMap<String, usize>,
    idf: AHashMap<String, f64>,
}

impl Bm25Index {
    /// Build an index over `documents`.
    ///
    /// Analysis runs in parallel; ordinals follow the order of `documents`.
    pub fn build(documents: &[Document], config: Bm25Config, analyzer: Arc<dyn Analyzer>) -> Self {
        let corpus: Vec<Vec<String>> = documents
            .par_iter()
            .map(|doc| analyzer.analyze(&doc.content))
            .collect();

        let doc_lengths: Vec<usize> = corpus.iter().map(Vec::len).collect();
        let total_terms: usize = doc_lengths.iter().sum();
        let avg_doc_length = if corpus.is_empty() {
            0.0
        } else {
            total_terms as f64 / corpus.len() as f64
        };

        let mut term_freqs = Vec::with_capacity(corpus.len());
        let mut doc_freqs: AHashMap<String, usize> = AHashMap::new();
        for terms in &corpus {
            let mut freqs: AHashMap<String, u32> = AHashMap::new();
            for term in terms {
                *freqs.entry(term.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let n = corpus.len() as f64;
        let idf = doc_freqs
            .iter()
            .map(|(term, &df)| {
                let df = df as f64;
                (term.clone(), ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect();

        Bm25Index {
            config,
            analyzer,
            corpus,
            doc_lengths,
            term_freqs,
            avg_doc_length,
            doc_freqs,
            idf,
        }
    }

    /// Get the scoring configuration.
    pub fn config(&self) -> &Bm25Config {
        &self.config
    }

    /// Number of indexed documents.
    pub fn corpus_size(&self) -> usize {
        self.corpus.len()
    }

    /// Average number of terms per document.
    pub fn avg_doc_length(&self) -> f64 {
        self.avg_doc_length
    }

    /// Number of documents containing `term`.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freqs.get(term).copied().unwrap_or(0)
    }

    /// Inverse document frequency of `term`, if indexed.
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    /// Analyzed terms of the document at `ordinal`.
    pub fn terms(&self, ordinal: usize) -> Option<&[String]> {
        self.corpus.get(ordinal).map(Vec::as_slice)
    }

    /// Summary statistics.
    pub fn stats(&self) -> KeywordIndexStats {
        KeywordIndexStats {
            corpus_size: self.corpus.len(),
            vocabulary_size: self.doc_freqs.len(),
            avg_doc_length: self.avg_doc_length,
        }
    }

    /// Analyze `query` with the index analyzer.
    pub fn analyze_query(&self, query: &str) -> Vec<String> {
        self.analyzer.analyze(query)
    }

    /// BM25 score of the document at `ordinal` for already-analyzed query terms.
    ///
    /// Repeated query terms contribute once per occurrence.
    pub fn score(&self, query_terms: &[String], ordinal: usize) -> f64 {
        let Some(freqs) = self.term_freqs.get(ordinal) else {
            return 0.0;
        };
        let length_ratio = if self.avg_doc_length > 0.0 {
            self.doc_lengths[ordinal] as f64 / self.avg_doc_length
        } else {
            0.0
        };
        let Bm25Config { k1, b } = self.config;

        let mut total = 0.0;
        for term in query_terms {
            let Some(idf) = self.idf.get(term) else {
                continue;
            };
            let tf = freqs.get(term).copied().unwrap_or(0) as f64;
            if tf == 0.0 {
                continue;
            }
            total += idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * length_ratio));
        }
        total
    }

    /// Return up to `k` hits sorted by descending score.
    ///
    /// Ties keep collection order (ordinal ascending). Documents scoring zero are
    /// excluded. An empty query, empty corpus or `k == 0` yields no hits.
    pub fn search(&self, query: &str, k: usize) -> Vec<KeywordHit> {
        if self.corpus.is_empty() || k == 0 {
            return Vec::new();
        }
        let query_terms = self.analyze_query(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<KeywordHit> = (0..self.corpus.len())
            .into_par_iter()
            .filter_map(|ordinal| {
                let score = self.score(&query_terms, ordinal);
                (score > 0.0).then(|| KeywordHit::new(ordinal, score))
            })
            .collect();

        // `sort_by` is stable, so equal scores stay in ordinal order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }
}
