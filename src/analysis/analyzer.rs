//! Analyzers combine a tokenizer and filters into one text → terms pipeline.

use std::fmt::Debug;
use std::sync::Arc;

use crate::analysis::stop::StopFilter;
use crate::analysis::tokenizer::{RegexTokenizer, Tokenizer};
use crate::error::Result;

/// Trait for analyzers that convert text into index terms.
pub trait Analyzer: Send + Sync + Debug {
    /// Analyze `text` into terms, in order of appearance.
    fn analyze(&self, text: &str) -> Vec<String>;

    /// Get the name of this analyzer.
    fn name(&self) -> &'static str;
}

/// The analyzer used by the keyword index.
///
/// Lower-cases, extracts `\w+` runs, removes stop words, and drops terms
/// shorter than `min_term_chars` characters (counted as Unicode scalar values).
#[derive(Clone, Debug)]
pub struct KeywordAnalyzer {
    tokenizer: Arc<dyn Tokenizer>,
    stop_filter: StopFilter,
    min_term_chars: usize,
}

impl KeywordAnalyzer {
    /// Create the default analyzer (Portuguese stop words, terms of 2+ chars).
    pub fn new() -> Result<Self> {
        Ok(Self::with_parts(
            Arc::new(RegexTokenizer::new()?),
            StopFilter::new(),
        ))
    }

    /// Create an analyzer from a custom tokenizer and stop filter.
    pub fn with_parts(tokenizer: Arc<dyn Tokenizer>, stop_filter: StopFilter) -> Self {
        KeywordAnalyzer {
            tokenizer,
            stop_filter,
            min_term_chars: 2,
        }
    }

    /// Override the minimum term length.
    pub fn min_term_chars(mut self, min_term_chars: usize) -> Self {
        self.min_term_chars = min_term_chars;
        self
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        let min = self.min_term_chars;
        self.stop_filter
            .filter(self.tokenizer.tokenize(text))
            .into_iter()
            .filter(|t| t.chars().count() >= min)
            .collect()
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
