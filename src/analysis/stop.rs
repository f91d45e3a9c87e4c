//! Stop word filtering.
//!
//! Removes common words that carry no ranking signal. The default list targets
//! Portuguese contract text; a custom list can be supplied instead.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

/// Default Portuguese stop words.
const DEFAULT_PORTUGUESE_STOP_WORDS: &[&str] = &[
    "a", "o", "e", "é", "de", "da", "do", "em", "um", "uma", "para", "com", "não", "os", "no",
    "se", "na", "por", "mais", "as", "dos", "como", "mas", "foi", "ao", "ele", "das", "tem", "à",
    "seu", "sua", "ou", "ser", "quando", "muito", "há", "nos", "já", "está", "eu", "também", "só",
    "pelo", "pela", "até", "isso", "ela", "entre", "era", "depois", "sem", "mesmo", "aos", "ter",
    "seus", "quem", "nas", "me", "esse", "eles", "estão", "você", "tinha", "foram", "essa", "num",
    "nem", "suas", "meu", "às", "minha", "têm", "numa", "pelos", "elas", "havia", "seja", "qual",
    "será", "nós", "tenho", "lhe", "deles", "essas", "esses", "pelas", "este", "fosse", "dele",
];

/// Default Portuguese stop words as a HashSet.
pub static DEFAULT_PORTUGUESE_STOP_WORDS_SET: LazyLock<HashSet<String>> = LazyLock::new(|| {
    DEFAULT_PORTUGUESE_STOP_WORDS
        .iter()
        .map(|&s| s.to_string())
        .collect()
});

/// A filter that removes stop words from a term list.
#[derive(Clone, Debug)]
pub struct StopFilter {
    /// The set of stop words to remove
    stop_words: Arc<HashSet<String>>,
}

impl StopFilter {
    /// Create a new stop filter with the default Portuguese stop words.
    pub fn new() -> Self {
        Self::with_stop_words(DEFAULT_PORTUGUESE_STOP_WORDS_SET.clone())
    }

    /// Create a stop filter with a custom set of stop words.
    pub fn with_stop_words(stop_words: HashSet<String>) -> Self {
        StopFilter {
            stop_words: Arc::new(stop_words),
        }
    }

    /// Create a stop filter from a list of words. Words are lower-cased to match
    /// the tokenizer output.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_stop_words(
            words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        )
    }

    /// Check if a word is a stop word.
    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    /// Number of configured stop words.
    pub fn len(&self) -> usize {
        self.stop_words.len()
    }

    /// Whether the filter has no stop words configured.
    pub fn is_empty(&self) -> bool {
        self.stop_words.is_empty()
    }

    /// Remove stop words from `terms`, keeping order.
    pub fn filter(&self, terms: Vec<String>) -> Vec<String> {
        terms
            .into_iter()
            .filter(|t| !self.is_stop_word(t))
            .collect()
    }
}

impl Default for StopFilter {
    fn default() -> Self {
        Self::new()
    }
}
