//! Representation (embedding) providers.
//!
//! Providers turn text into dense vectors for semantic search. Remote
//! providers are slow, rate limited and occasionally unavailable, so they are
//! normally used through [`cached::CachedEmbedder`] (or its async twin), which
//! consults the tiered cache first and retries misses under a
//! [`crate::resilience::RetryPolicy`].
//!
//! [`hashing::HashingEmbedder`] is a deterministic offline provider, useful for
//! tests and for running the CLI without network access.

pub mod cached;
pub mod hashing;
pub mod provider;

pub use crate::embedding::cached::{AsyncCachedEmbedder, CachedEmbedder};
pub use crate::embedding::hashing::HashingEmbedder;
pub use crate::embedding::provider::{AsyncEmbeddingProvider, EmbeddingProvider};
