//! Tokenizers that split text into raw terms.

use std::fmt::Debug;
use std::sync::Arc;

use regex::Regex;

use crate::error::{HalberdError, Result};

/// Trait for tokenizers that convert text into terms.
///
/// The trait requires `Send + Sync` so one tokenizer can be shared by
/// concurrent index builds and searches.
pub trait Tokenizer: Send + Sync + Debug {
    /// Split `text` into terms, in order of appearance.
    fn tokenize(&self, text: &str) -> Vec<String>;

    /// Get the name of this tokenizer (for debugging and configuration).
    fn name(&self) -> &'static str;
}

/// A regex-based tokenizer that lower-cases its input and extracts every match.
///
/// The default pattern `\w+` (Unicode-aware) yields maximal runs of word
/// characters, which is the same as replacing every non-word, non-space
/// character with a space and splitting on whitespace.
#[derive(Clone, Debug)]
pub struct RegexTokenizer {
    /// The regex pattern used to extract tokens
    pattern: Arc<Regex>,
    /// Whether to lower-case the text before matching
    lowercase: bool,
}

impl RegexTokenizer {
    /// Create a new lower-casing tokenizer with the default `\w+` pattern.
    pub fn new() -> Result<Self> {
        Self::with_pattern(r"\w+")
    }

    /// Create a new lower-casing tokenizer with a custom pattern.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| HalberdError::analysis(format!("Invalid regex pattern: {e}")))?;

        Ok(RegexTokenizer {
            pattern: Arc::new(regex),
            lowercase: true,
        })
    }

    /// Keep the original casing of the input.
    pub fn preserve_case(mut self) -> Self {
        self.lowercase = false;
        self
    }

    /// Get the regex pattern used by this tokenizer.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        if self.lowercase {
            let lowered = text.to_lowercase();
            self.pattern
                .find_iter(&lowered)
                .map(|mat| mat.as_str().to_string())
                .collect()
        } else {
            self.pattern
                .find_iter(text)
                .map(|mat| mat.as_str().to_string())
                .collect()
        }
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}
