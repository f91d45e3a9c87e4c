//! One index generation: the documents plus their BM25 index.

use std::sync::Arc;

use ahash::AHashMap;

use crate::document::{Document, DocumentId};
use crate::lexical::bm25::Bm25Index;

/// Documents, BM25 index and lookup maps published together by `index`.
///
/// Semantic hits are resolved to ordinals through the id map when the hit
/// carries an id the collection knows, otherwise through exact content
/// equality. Both maps are built once per generation.
/// When several documents share an id or content, the first one wins.
#[derive(Debug)]
pub struct IndexedCorpus {
    documents: Vec<Document>,
    keyword: Arc<Bm25Index>,
    by_id: AHashMap<DocumentId, usize>,
    by_content: AHashMap<String, usize>,
}

impl IndexedCorpus {
    pub fn new(documents: Vec<Document>, keyword: Arc<Bm25Index>) -> Self {
        let mut by_id = AHashMap::new();
        let mut by_content = AHashMap::with_capacity(documents.len());
        for (ordinal, doc) in documents.iter().enumerate() {
            if let Some(id) = &doc.id {
                by_id.entry(id.clone()).or_insert(ordinal);
            }
            by_content.entry(doc.content.clone()).or_insert(ordinal);
        }
        IndexedCorpus {
            documents,
            keyword,
            by_id,
            by_content,
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, ordinal: usize) -> Option<&Document> {
        self.documents.get(ordinal)
    }

    pub fn keyword_index(&self) -> &Arc<Bm25Index> {
        &self.keyword
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Ordinal of the indexed document `doc` refers to.
    pub fn resolve(&self, doc: &Document) -> Option<usize> {
        doc.id
            .as_ref()
            .and_then(|id| self.by_id.get(id))
            .or_else(|| self.by_content.get(&doc.content))
            .copied()
    }
}
