//! # Halberd
//!
//! Hybrid retrieval for question answering over indexed documents.
//!
//! ## Features
//!
//! - BM25 keyword index with atomic rebuilds ([`lexical`])
//! - Reciprocal Rank Fusion of keyword and semantic rankings ([`hybrid`])
//! - Two-tier (memory + disk) cache for embedding vectors ([`cache`])
//! - Retry with exponential backoff and per-dependency circuit breakers ([`resilience`])
//! - Cached, resilient embedding providers and an exact in-memory vector store
//!   ([`embedding`], [`vector`])
//! - Counters, gauges and timers for retries, breakers, caches and searches ([`metrics`])

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod hybrid;
pub mod lexical;
pub mod metrics;
pub mod resilience;
pub mod vector;

pub mod prelude {
    pub use crate::document::{Document, DocumentId};
    pub use crate::error::{HalberdError, Result};
    pub use crate::hybrid::{FusionResult, HybridEngine, HybridSearchConfig, SemanticHit, SemanticSearcher};
    pub use crate::lexical::index::KeywordIndex;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
