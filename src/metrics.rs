//! Operational metrics: counters, gauges and timers.
//!
//! A [`MetricsCollector`] is an ordinary value shared by `Arc`. The cache
//! tiers, circuit breakers, retry policies and hybrid engines each hold one
//! (a private collector unless the caller wires a shared one in) and record
//! the names listed below. Every metric is addressed by a name plus an
//! optional set of `key=value` labels.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::duration_secs;

/// Retries scheduled after a failed attempt. Labels: `policy`, `attempt`.
pub const RETRY_ATTEMPTS: &str = "retry_attempts";
/// Calls that failed on their last allowed attempt. Labels: `policy`.
pub const RETRY_EXHAUSTED: &str = "retry_exhausted";
/// Transitions into the open state. Labels: `name`.
pub const CIRCUIT_BREAKER_OPENED: &str = "circuit_breaker_opened";
/// Half-open breakers that closed again. Labels: `name`.
pub const CIRCUIT_BREAKER_RECOVERED: &str = "circuit_breaker_recovered";
/// Cache reads that returned a value. Labels: `tier`.
pub const CACHE_HITS: &str = "cache_hits";
/// Cache reads that returned nothing. Labels: `tier`.
pub const CACHE_MISSES: &str = "cache_misses";
/// Entries dropped by capacity eviction or expiry. Labels: `tier`.
pub const CACHE_EVICTIONS: &str = "cache_evictions";
/// L2 hits written back to L1. Labels: `model`.
pub const CACHE_PROMOTIONS: &str = "cache_promotions";
/// Gauge: entries currently held. Labels: `tier`.
pub const CACHE_SIZE: &str = "cache_size";
/// Hybrid searches that ranked an indexed collection.
pub const HYBRID_SEARCH_TOTAL: &str = "hybrid_search_total";
/// Timer: wall time of a hybrid search.
pub const HYBRID_SEARCH_DURATION: &str = "hybrid_search_duration";

/// Upper bounds (seconds) of the timer histogram buckets.
pub const DEFAULT_BUCKETS: [f64; 9] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Canonical label string: pairs sorted by key, joined as `k=v,k=v`.
fn labels_key(labels: &[(&str, &str)]) -> String {
    let mut pairs = labels.to_vec();
    pairs.sort_unstable();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MetricKey {
    name: String,
    labels: String,
}

impl MetricKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        MetricKey {
            name: name.to_string(),
            labels: labels_key(labels),
        }
    }
}

/// Lock-free accumulator behind one timer.
#[derive(Debug)]
struct TimerCell {
    count: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
    /// Cumulative: slot `i` counts observations `<= DEFAULT_BUCKETS[i]`.
    buckets: [AtomicU64; DEFAULT_BUCKETS.len()],
}

impl TimerCell {
    fn new() -> Self {
        TimerCell {
            count: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.min_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);

        let secs = elapsed.as_secs_f64();
        for (bound, slot) in DEFAULT_BUCKETS.iter().zip(&self.buckets) {
            if secs <= *bound {
                slot.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> TimerStats {
        let count = self.count.load(Ordering::Relaxed);
        let total_nanos = self.total_nanos.load(Ordering::Relaxed);
        let min_nanos = self.min_nanos.load(Ordering::Relaxed);
        TimerStats {
            count,
            total: Duration::from_nanos(total_nanos),
            avg: Duration::from_nanos(total_nanos.checked_div(count).unwrap_or(0)),
            min: if min_nanos == u64::MAX {
                Duration::ZERO
            } else {
                Duration::from_nanos(min_nanos)
            },
            max: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)),
            buckets: DEFAULT_BUCKETS
                .iter()
                .zip(&self.buckets)
                .map(|(le, slot)| HistogramBucket {
                    le: *le,
                    count: slot.load(Ordering::Relaxed),
                })
                .collect(),
        }
    }
}

/// One cumulative histogram bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBucket {
    /// Upper bound in seconds.
    pub le: f64,
    pub count: u64,
}

/// Aggregated observations of one timer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerStats {
    pub count: u64,
    #[serde(with = "duration_secs")]
    pub total: Duration,
    #[serde(with = "duration_secs")]
    pub avg: Duration,
    #[serde(with = "duration_secs")]
    pub min: Duration,
    #[serde(with = "duration_secs")]
    pub max: Duration,
    /// Observations are also counted in an implicit `+Inf` bucket equal to `count`.
    pub buckets: Vec<HistogramBucket>,
}

/// Point-in-time export of every metric, grouped by name then label string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub uptime: Duration,
    pub counters: BTreeMap<String, BTreeMap<String, u64>>,
    pub gauges: BTreeMap<String, BTreeMap<String, i64>>,
    pub timers: BTreeMap<String, BTreeMap<String, TimerStats>>,
}

impl MetricsSnapshot {
    /// Sum of a counter over all of its label sets.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map_or(0, |values| values.values().sum())
    }
}

/// Thread-safe registry of named counters, gauges and timers.
///
/// Cells are created on first use and then updated with atomic operations;
/// the map lock is only taken for writing when a new name/label pair appears.
#[derive(Debug)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<MetricKey, Arc<AtomicU64>>>,
    gauges: RwLock<AHashMap<MetricKey, Arc<AtomicI64>>>,
    timers: RwLock<AHashMap<MetricKey, Arc<TimerCell>>>,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch-or-insert a cell, taking the write lock only on first use.
fn cell<T>(map: &RwLock<AHashMap<MetricKey, Arc<T>>>, key: MetricKey, init: impl FnOnce() -> T) -> Arc<T> {
    if let Some(cell) = map.read().get(&key) {
        return Arc::clone(cell);
    }
    Arc::clone(map.write().entry(key).or_insert_with(|| Arc::new(init())))
}

fn group<T, U>(map: &RwLock<AHashMap<MetricKey, Arc<T>>>, read: impl Fn(&T) -> U) -> BTreeMap<String, BTreeMap<String, U>> {
    let mut grouped: BTreeMap<String, BTreeMap<String, U>> = BTreeMap::new();
    for (key, cell) in map.read().iter() {
        grouped
            .entry(key.name.clone())
            .or_default()
            .insert(key.labels.clone(), read(cell));
    }
    grouped
}

impl MetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        MetricsCollector {
            counters: RwLock::new(AHashMap::new()),
            gauges: RwLock::new(AHashMap::new()),
            timers: RwLock::new(AHashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Convenience for `Arc::new(MetricsCollector::new())`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add one to a counter.
    pub fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_by(name, labels, 1);
    }

    /// Add `value` to a counter.
    pub fn increment_by(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        if value == 0 {
            return;
        }
        cell(&self.counters, MetricKey::new(name, labels), || AtomicU64::new(0)).fetch_add(value, Ordering::Relaxed);
    }

    /// Current value of a counter; 0 if never incremented.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .read()
            .get(&MetricKey::new(name, labels))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Set a gauge.
    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        cell(&self.gauges, MetricKey::new(name, labels), || AtomicI64::new(0)).store(value, Ordering::Relaxed);
    }

    /// Move a gauge by `delta`.
    pub fn add_gauge(&self, name: &str, labels: &[(&str, &str)], delta: i64) {
        cell(&self.gauges, MetricKey::new(name, labels), || AtomicI64::new(0)).fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value of a gauge; 0 if never set.
    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> i64 {
        self.gauges
            .read()
            .get(&MetricKey::new(name, labels))
            .map_or(0, |g| g.load(Ordering::Relaxed))
    }

    /// Record one timed observation.
    pub fn record_time(&self, name: &str, labels: &[(&str, &str)], elapsed: Duration) {
        cell(&self.timers, MetricKey::new(name, labels), TimerCell::new).record(elapsed);
    }

    /// Run `f` and record how long it took.
    pub fn time<T>(&self, name: &str, labels: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let timer = Timer::start();
        let value = f();
        self.record_time(name, labels, timer.stop());
        value
    }

    /// Aggregates of a timer, if it has been recorded.
    pub fn timer_stats(&self, name: &str, labels: &[(&str, &str)]) -> Option<TimerStats> {
        self.timers
            .read()
            .get(&MetricKey::new(name, labels))
            .map(|cell| cell.snapshot())
    }

    /// Export every metric.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            uptime: self.uptime(),
            counters: group(&self.counters, |c| c.load(Ordering::Relaxed)),
            gauges: group(&self.gauges, |g| g.load(Ordering::Relaxed)),
            timers: group(&self.timers, TimerCell::snapshot),
        }
    }

    /// Drop every metric.
    pub fn reset(&self) {
        self.counters.write().clear();
        self.gauges.write().clear();
        self.timers.write().clear();
    }

    /// Time since the collector was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Get elapsed time.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return elapsed time.
    pub fn stop(self) -> Duration {
        self.start.elapsed()
    }
}
