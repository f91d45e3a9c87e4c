//! Dense-vector similarity search.
//!
//! [`store::FlatVectorStore`] is an exact, in-memory semantic searcher. It
//! implements [`crate::hybrid::SemanticSearcher`], so it can stand in for an
//! external vector database in the hybrid engine.

pub mod distance;
pub mod store;

pub use crate::vector::distance::{cosine_distance, cosine_similarity};
pub use crate::vector::store::FlatVectorStore;
