//! Per-dependency circuit breaker.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::duration_secs;
use crate::error::{HalberdError, Result};
use crate::metrics::{CIRCUIT_BREAKER_OPENED, CIRCUIT_BREAKER_RECOVERED, MetricsCollector};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are rejected without reaching the dependency.
    Open,
    /// A bounded number of trial calls pass through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(name)
    }
}

/// Thresholds of a [`CircuitBreaker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed breaker.
    pub failure_threshold: u32,
    /// Half-open successes that close the breaker again.
    pub success_threshold: u32,
    /// Cooldown after the last failure before an open breaker goes half-open.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Reject zero thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(HalberdError::config("circuit_breaker.failure_threshold must be at least 1"));
        }
        if self.success_threshold == 0 {
            return Err(HalberdError::config("circuit_breaker.success_threshold must be at least 1"));
        }
        if self.half_open_max_calls == 0 {
            return Err(HalberdError::config("circuit_breaker.half_open_max_calls must be at least 1"));
        }
        Ok(())
    }
}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub half_open_calls: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
}

impl BreakerState {
    fn closed() -> Self {
        BreakerState {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            half_open_calls: 0,
        }
    }
}

/// Circuit breaker for one named dependency.
///
/// The Open → HalfOpen transition is evaluated lazily whenever the state is
/// inspected; there is no timer. All counters, including the half-open
/// admission counter, live behind a single lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    metrics: Arc<MetricsCollector>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new<S: Into<String>>(name: S, config: CircuitBreakerConfig) -> Self {
        CircuitBreaker {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::closed()),
            metrics: MetricsCollector::shared(),
        }
    }

    /// Count open/recover transitions in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Dependency name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, after applying a pending cooldown transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Whether a call may proceed now. Consumes one trial slot when half-open.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.half_open_calls = 0;
                    tracing::info!(
                        event = "resilience.breaker.closed",
                        name = %self.name,
                        "circuit breaker closed (recovered)"
                    );
                    self.metrics.increment(CIRCUIT_BREAKER_RECOVERED, &[("name", self.name.as_str())]);
                }
            }
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                inner.half_open_calls = 0;
                tracing::warn!(
                    event = "resilience.breaker.opened",
                    name = %self.name,
                    from = "half_open",
                    "circuit breaker re-opened after a trial failure"
                );
                self.metrics.increment(CIRCUIT_BREAKER_OPENED, &[("name", self.name.as_str())]);
            }
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    event = "resilience.breaker.opened",
                    name = %self.name,
                    failure_count = inner.failure_count,
                    "circuit breaker opened"
                );
                self.metrics.increment(CIRCUIT_BREAKER_OPENED, &[("name", self.name.as_str())]);
            }
            _ => {}
        }
    }

    /// Counters and state, after applying a pending cooldown transition.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            half_open_calls: inner.half_open_calls,
        }
    }

    /// Force the breaker back to closed with cleared counters.
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::closed();
        tracing::info!(event = "resilience.breaker.reset", name = %self.name, "circuit breaker reset");
    }

    fn refresh(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            return;
        }
        let Some(last_failure) = inner.last_failure else {
            return;
        };
        let elapsed = last_failure.elapsed();
        if elapsed >= self.config.timeout {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_calls = 0;
            inner.success_count = 0;
            tracing::info!(
                event = "resilience.breaker.half_open",
                name = %self.name,
                elapsed_secs = elapsed.as_secs_f64(),
                "circuit breaker half-open"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn config(timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout,
            half_open_max_calls: 2,
        }
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new("dep", config(Duration::from_secs(60)));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_success_resets_failures_when_closed() {
        let breaker = CircuitBreaker::new("dep", config(Duration::from_secs(60)));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failure_count, 2);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new("dep", config(Duration::from_millis(20)));
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(breaker.can_execute());
        assert!(breaker.can_execute());
        assert!(!breaker.can_execute());
        assert_eq!(breaker.snapshot().half_open_calls, 2);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("dep", config(Duration::from_millis(20)));
        for _ in 0..3 {
            breaker.record_failure();
        }
        thread::sleep(Duration::from_millis(40));
        assert!(breaker.can_execute());
        breaker.record_success();
        breaker.record_failure();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.success_count, 0);
    }

    #[test]
    fn test_half_open_successes_close() {
        let breaker = CircuitBreaker::new("dep", config(Duration::from_millis(20)));
        for _ in 0..3 {
            breaker.record_failure();
        }
        thread::sleep(Duration::from_millis(40));
        assert!(breaker.can_execute());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
    }

    #[test]
    fn test_transitions_counted() {
        let metrics = MetricsCollector::shared();
        let breaker = CircuitBreaker::new("openai", config(Duration::from_millis(20))).with_metrics(Arc::clone(&metrics));
        let labels = [("name", "openai")];

        for _ in 0..3 {
            breaker.record_failure();
        }
        breaker.record_failure();
        assert_eq!(metrics.counter(CIRCUIT_BREAKER_OPENED, &labels), 1);

        thread::sleep(Duration::from_millis(40));
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert_eq!(metrics.counter(CIRCUIT_BREAKER_OPENED, &labels), 2);

        thread::sleep(Duration::from_millis(40));
        assert!(breaker.can_execute());
        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(metrics.counter(CIRCUIT_BREAKER_RECOVERED, &labels), 1);
    }

    #[test]
    fn test_reset() {
        let breaker = CircuitBreaker::new("dep", config(Duration::from_secs(60)));
        for _ in 0..3 {
            breaker.record_failure();
        }
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_state_display_and_serde() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(serde_json::to_string(&CircuitState::Open).unwrap(), r#""open""#);
    }

    #[test]
    fn test_config_validate() {
        CircuitBreakerConfig::default().validate().unwrap();
        let mut bad = CircuitBreakerConfig::default();
        bad.failure_threshold = 0;
        assert!(bad.validate().is_err());
    }
}
