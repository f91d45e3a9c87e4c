//! Documents handed to the keyword index and the semantic search provider.
//!
//! A document is an opaque text payload with an optional metadata map. Within one
//! index generation it is addressed by its ordinal (position in the collection passed
//! to `fit`/`index`). Ingestion may additionally attach a stable [`DocumentId`],
//! which the hybrid engine prefers over content equality when resolving semantic
//! search hits back to ordinals.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier assigned to a document by ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document identifier.
    pub fn new<S: Into<String>>(id: S) -> Self {
        DocumentId(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        DocumentId::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        DocumentId(id)
    }
}

/// A text document with optional metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Optional stable identifier carried end-to-end from ingestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    /// The text payload.
    pub content: String,
    /// Free-form metadata (source file, page, chunk number, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document from its text content.
    pub fn new<S: Into<String>>(content: S) -> Self {
        Document {
            id: None,
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a stable identifier.
    pub fn with_id<I: Into<DocumentId>>(mut self, id: I) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a metadata value.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl From<&str> for Document {
    fn from(content: &str) -> Self {
        Document::new(content)
    }
}

impl From<String> for Document {
    fn from(content: String) -> Self {
        Document::new(content)
    }
}
