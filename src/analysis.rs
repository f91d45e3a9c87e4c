//! Text analysis for keyword scoring.
//!
//! Analysis turns raw document or query text into the terms the BM25 index
//! scores against:
//!
//! ```text
//! Raw Text → Tokenizer (lowercase, \w+ runs) → StopFilter → length filter → Terms
//! ```
//!
//! The same [`analyzer::KeywordAnalyzer`] must be used for indexing and for
//! querying, otherwise query terms will not line up with indexed terms.

pub mod analyzer;
pub mod stop;
pub mod tokenizer;
