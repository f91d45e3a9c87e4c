//! The operations every cache tier implements.

use std::time::Duration;

use crate::cache::entry::CacheStats;

/// A key/value cache tier.
///
/// Implementations must never return an expired entry: an expired entry reads
/// as a miss and is purged lazily. Backends never surface their own I/O
/// failures; a broken tier degrades to misses and no-op writes.
pub trait CacheBackend<V>: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<V>;

    /// Write a value.
    ///
    /// `ttl = None` uses the backend default TTL; `Some(Duration::ZERO)` stores
    /// an entry that never expires.
    fn set(&self, key: &str, value: V, ttl: Option<Duration>);

    /// Remove a key. Returns `true` iff an entry was removed.
    fn delete(&self, key: &str) -> bool;

    /// Remove every entry.
    fn clear(&self);

    /// Whether a live (unexpired) entry exists. Does not count as a read.
    fn exists(&self, key: &str) -> bool;

    /// Snapshot of the tier counters.
    fn stats(&self) -> CacheStats;

    /// Short tier name used in logs.
    fn name(&self) -> &'static str;
}
