//! Cache entries and statistics.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{CACHE_EVICTIONS, CACHE_HITS, CACHE_MISSES, CACHE_SIZE, MetricsCollector};

/// A cached value with creation time, optional expiry and a hit counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// When the entry stops being readable. `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Number of reads served by this entry.
    pub hits: u64,
}

impl<V> CacheEntry<V> {
    /// Create a new entry expiring `ttl` from now. `None` never expires.
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        let created_at = Utc::now();
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|delta| created_at.checked_add_signed(delta))
        });
        CacheEntry {
            value,
            created_at,
            expires_at,
            hits: 0,
        }
    }

    /// Whether the entry has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the entry has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Record a read served by this entry.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }
}

/// Resolve a caller TTL against a backend default.
///
/// `None` selects the default; a zero duration (from either source) means the
/// entry never expires.
pub(crate) fn resolve_ttl(ttl: Option<Duration>, default_ttl: Duration) -> Option<Duration> {
    let ttl = ttl.unwrap_or(default_ttl);
    (!ttl.is_zero()).then_some(ttl)
}

/// Point-in-time snapshot of cache counters.
///
/// Serializes with an extra derived `hit_rate` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SerializedCacheStats")]
pub struct CacheStats {
    /// Reads that returned a value.
    pub hits: u64,
    /// Reads that returned nothing (absent, expired or unreadable).
    pub misses: u64,
    /// Entries removed by capacity eviction or expiry purges.
    pub evictions: u64,
    /// Current number of entries.
    pub size: u64,
}

impl CacheStats {
    /// Fraction of reads that were hits; `0.0` when nothing was read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Serialize)]
struct SerializedCacheStats {
    hits: u64,
    misses: u64,
    evictions: u64,
    size: u64,
    hit_rate: f64,
}

impl From<CacheStats> for SerializedCacheStats {
    fn from(stats: CacheStats) -> Self {
        SerializedCacheStats {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            size: stats.size,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Lock-free counters behind [`CacheStats`], mirrored into a [`MetricsCollector`]
/// under the `tier` label.
///
/// Readers take a snapshot without blocking writers; the snapshot is only
/// eventually consistent across fields.
#[derive(Debug)]
pub(crate) struct StatsCounters {
    tier: &'static str,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    size: AtomicU64,
    metrics: Arc<MetricsCollector>,
}

impl StatsCounters {
    pub(crate) fn new(tier: &'static str) -> Self {
        StatsCounters {
            tier,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            size: AtomicU64::new(0),
            metrics: MetricsCollector::shared(),
        }
    }

    pub(crate) fn set_metrics(&mut self, metrics: Arc<MetricsCollector>) {
        metrics.set_gauge(CACHE_SIZE, &[("tier", self.tier)], self.size.load(Ordering::Relaxed) as i64);
        self.metrics = metrics;
    }

    pub(crate) fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.metrics.increment(CACHE_HITS, &[("tier", self.tier)]);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.metrics.increment(CACHE_MISSES, &[("tier", self.tier)]);
    }

    pub(crate) fn record_evictions(&self, count: u64) {
        if count > 0 {
            self.evictions.fetch_add(count, Ordering::Relaxed);
            self.metrics.increment_by(CACHE_EVICTIONS, &[("tier", self.tier)], count);
        }
    }

    pub(crate) fn set_size(&self, size: usize) {
        self.size.store(size as u64, Ordering::Relaxed);
        self.metrics.set_gauge(CACHE_SIZE, &[("tier", self.tier)], size as i64);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.size.load(Ordering::Relaxed),
        }
    }
}
