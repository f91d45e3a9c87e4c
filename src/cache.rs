//! Multi-tier caching of expensive representation vectors.
//!
//! - [`memory::MemoryCache`] (L1): bounded, in-process, frequency-aware eviction
//! - [`file::FileCache`] (L2): unbounded, on disk, survives restarts
//! - [`tiered::TieredCache`]: L1 → L2 lookup with promotion, keyed by a content
//!   hash of `(model, text)`
//! - [`registry::CacheRegistry`]: one tiered cache per model identifier
//!
//! Every tier serializes its own mutations behind one lock; tiers are never
//! locked together, so the tiered lookup is not atomic as a whole. Racing
//! promotions rewrite the same value and are harmless.

pub mod backend;
pub mod entry;
pub mod file;
pub mod memory;
pub mod registry;
pub mod tiered;

use serde::{Deserialize, Serialize};

use crate::cache::file::FileCacheConfig;
use crate::cache::memory::MemoryCacheConfig;
use crate::error::Result;

pub use crate::cache::backend::CacheBackend;
pub use crate::cache::entry::{CacheEntry, CacheStats};

/// Configuration of both cache tiers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// In-memory tier.
    pub l1: MemoryCacheConfig,
    /// On-disk tier.
    pub l2: FileCacheConfig,
}

impl CacheConfig {
    /// Validate both tiers.
    pub fn validate(&self) -> Result<()> {
        self.l1.validate()?;
        self.l2.validate()
    }
}
