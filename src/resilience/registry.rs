//! Named circuit breakers shared across call sites.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::metrics::MetricsCollector;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

/// Holds exactly one breaker per dependency name.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breakers created from now on record their transitions in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The breaker named `name`, created with `config` if it does not exist.
    ///
    /// `config` is ignored when the breaker already exists.
    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| {
                    let breaker = CircuitBreaker::new(name, config);
                    Arc::new(match &self.metrics {
                        Some(metrics) => breaker.with_metrics(Arc::clone(metrics)),
                        None => breaker,
                    })
                }),
        )
    }

    /// The breaker named `name`, if one was created.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
