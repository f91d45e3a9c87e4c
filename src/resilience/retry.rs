//! Retry with exponential backoff, optionally guarded by a circuit breaker.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::duration_secs;
use crate::error::{CircuitOpenError, HalberdError, Result};
use crate::metrics::{MetricsCollector, RETRY_ATTEMPTS, RETRY_EXHAUSTED};
use crate::resilience::circuit_breaker::CircuitBreaker;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// Upper bound of any single delay (before jitter).
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Multiply each delay by a random factor in `[0.5, 1.5)`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Preset for representation (embedding) providers.
    pub fn embedding_service() -> Self {
        RetryConfig {
            max_delay: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Preset for semantic search backends.
    pub fn vector_store() -> Self {
        RetryConfig {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Same parameters without any sleeping; handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 2.0,
            jitter: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(HalberdError::config("retry.max_attempts must be at least 1"));
        }
        if !self.exponential_base.is_finite() || self.exponential_base < 1.0 {
            return Err(HalberdError::config("retry.exponential_base must be a finite number >= 1"));
        }
        Ok(())
    }

    /// Delay after the failed attempt numbered `attempt` (0-based):
    /// `min(initial_delay * base^attempt, max_delay)`, jittered when enabled.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let raw = if raw.is_nan() { 0.0 } else { raw };
        let mut secs = raw.min(self.max_delay.as_secs_f64());
        if self.jitter {
            secs *= rand::rng().random_range(0.5..1.5);
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// State and decision logic shared by the blocking and async policies.
struct PolicyCore<E> {
    config: RetryConfig,
    predicate: Predicate<E>,
    breaker: Option<Arc<CircuitBreaker>>,
    name: Option<String>,
    metrics: Arc<MetricsCollector>,
}

enum Next {
    Retry(Duration),
    GiveUp,
}

impl<E> Clone for PolicyCore<E> {
    fn clone(&self) -> Self {
        PolicyCore {
            config: self.config.clone(),
            predicate: Arc::clone(&self.predicate),
            breaker: self.breaker.clone(),
            name: self.name.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<E: 'static> PolicyCore<E> {
    fn new(config: RetryConfig) -> Self {
        PolicyCore {
            config,
            predicate: Arc::new(|_: &E| true),
            breaker: None,
            name: None,
            metrics: MetricsCollector::shared(),
        }
    }
}

impl<E> PolicyCore<E> {
    /// Label used in logs and metrics: the explicit name, else the breaker's.
    fn name(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.breaker.as_deref().map(CircuitBreaker::name))
            .unwrap_or("default")
    }

    fn debug(&self, f: &mut fmt::Formatter<'_>, type_name: &str) -> fmt::Result {
        f.debug_struct(type_name)
            .field("name", &self.name())
            .field("config", &self.config)
            .field("breaker", &self.breaker.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

impl<E: fmt::Display> PolicyCore<E> {
    fn admit(&self) -> std::result::Result<(), CircuitOpenError> {
        match self.breaker.as_deref() {
            Some(breaker) if !breaker.can_execute() => {
                tracing::warn!(
                    event = "resilience.retry.rejected",
                    name = breaker.name(),
                    "call rejected by open circuit breaker"
                );
                Err(CircuitOpenError::new(breaker.name()))
            }
            _ => Ok(()),
        }
    }

    fn succeeded(&self) {
        if let Some(breaker) = &self.breaker {
            breaker.record_success();
        }
    }

    fn failed(&self, attempt: u32, error: &E) -> Next {
        let policy = self.name();

        if !(self.predicate)(error) {
            tracing::debug!(
                event = "resilience.retry.not_retryable",
                policy,
                error = %error,
                "failure is not retryable"
            );
            self.record_failure();
            return Next::GiveUp;
        }

        if attempt + 1 < self.config.max_attempts {
            let delay = self.config.calculate_delay(attempt);
            tracing::warn!(
                event = "resilience.retry.attempt_failed",
                policy,
                attempt = attempt + 1,
                max_attempts = self.config.max_attempts,
                delay_secs = delay.as_secs_f64(),
                error = %error,
                "attempt failed, retrying"
            );
            let attempt_label = (attempt + 1).to_string();
            self.metrics
                .increment(RETRY_ATTEMPTS, &[("policy", policy), ("attempt", attempt_label.as_str())]);
            Next::Retry(delay)
        } else {
            tracing::error!(
                event = "resilience.retry.exhausted",
                policy,
                max_attempts = self.config.max_attempts,
                error = %error,
                "all retry attempts exhausted"
            );
            self.metrics.increment(RETRY_EXHAUSTED, &[("policy", policy)]);
            self.record_failure();
            Next::GiveUp
        }
    }

    fn record_failure(&self) {
        if let Some(breaker) = &self.breaker {
            breaker.record_failure();
        }
    }
}

/// Blocking retry policy.
///
/// ```
/// use halberd::error::HalberdError;
/// use halberd::resilience::{RetryConfig, RetryPolicy};
///
/// let policy = RetryPolicy::<HalberdError>::new(RetryConfig::immediate(3));
/// let mut calls = 0;
/// let value = policy
///     .call(|| {
///         calls += 1;
///         if calls < 3 { Err(HalberdError::timeout("slow")) } else { Ok(calls) }
///     })
///     .unwrap();
/// assert_eq!(value, 3);
/// ```
pub struct RetryPolicy<E> {
    core: PolicyCore<E>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        RetryPolicy { core: self.core.clone() }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.debug(f, "RetryPolicy")
    }
}

impl<E: 'static> RetryPolicy<E> {
    /// Retry every failure.
    pub fn new(config: RetryConfig) -> Self {
        RetryPolicy {
            core: PolicyCore::new(config),
        }
    }

    /// Retry only failures for which `predicate` returns `true`.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.core.predicate = Arc::new(predicate);
        self
    }

    /// Guard calls with `breaker` and report outcomes to it.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.core.breaker = Some(breaker);
        self
    }

    /// Name used in logs and metric labels. Defaults to the breaker's name.
    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.core.name = Some(name.into());
        self
    }

    /// Count retries and exhaustion in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.core.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.core.config
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.core.breaker.as_ref()
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.core.metrics
    }
}

impl RetryPolicy<HalberdError> {
    /// Retry only [`HalberdError::is_transient`] failures.
    pub fn transient(config: RetryConfig) -> Self {
        Self::new(config).retry_if(HalberdError::is_transient)
    }
}

/// Async retry policy; sleeps with `tokio::time::sleep`.
pub struct AsyncRetryPolicy<E> {
    core: PolicyCore<E>,
}

impl<E> Clone for AsyncRetryPolicy<E> {
    fn clone(&self) -> Self {
        AsyncRetryPolicy { core: self.core.clone() }
    }
}

impl<E> fmt::Debug for AsyncRetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.debug(f, "AsyncRetryPolicy")
    }
}

impl<E: 'static> AsyncRetryPolicy<E> {
    /// Retry every failure.
    pub fn new(config: RetryConfig) -> Self {
        AsyncRetryPolicy {
            core: PolicyCore::new(config),
        }
    }

    /// Retry only failures for which `predicate` returns `true`.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.core.predicate = Arc::new(predicate);
        self
    }

    /// Guard calls with `breaker` and report outcomes to it.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.core.breaker = Some(breaker);
        self
    }

    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.core.name = Some(name.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.core.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.core.config
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.core.breaker.as_ref()
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.core.metrics
    }
}

impl AsyncRetryPolicy<HalberdError> {
    /// Retry only [`HalberdError::is_transient`] failures.
    pub fn transient(config: RetryConfig) -> Self {
        Self::new(config).retry_if(HalberdError::is_transient)
    }
}

impl<E> RetryPolicy<E>
where
    E: From<CircuitOpenError> + fmt::Display + 'static,
{
    /// Run `op` under this policy, sleeping the current thread between attempts.
    pub fn call<T, F>(&self, mut op: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> std::result::Result<T, E>,
    {
        let core = &self.core;
        core.admit()?;

        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => {
                    core.succeeded();
                    return Ok(value);
                }
                Err(error) => match core.failed(attempt, &error) {
                    Next::Retry(delay) => {
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                        attempt += 1;
                    }
                    Next::GiveUp => return Err(error),
                },
            }
        }
    }

    /// Turn `op` into a function with the same signature that runs under this policy.
    pub fn wrap<A, T, F>(self, op: F) -> impl Fn(&A) -> std::result::Result<T, E>
    where
        A: ?Sized,
        F: Fn(&A) -> std::result::Result<T, E>,
    {
        move |arg: &A| self.call(|| op(arg))
    }
}

/// Boxed future returned by [`AsyncRetryPolicy::wrap`].
pub type RetryFuture<T, E> = Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send>>;

impl<E> AsyncRetryPolicy<E>
where
    E: From<CircuitOpenError> + fmt::Display + 'static,
{
    /// Run `op` under this policy, yielding to the runtime between attempts.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let core = &self.core;
        core.admit()?;

        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => {
                    core.succeeded();
                    return Ok(value);
                }
                Err(error) => match core.failed(attempt, &error) {
                    Next::Retry(delay) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        attempt += 1;
                    }
                    Next::GiveUp => return Err(error),
                },
            }
        }
    }

    /// Turn an async `op` into a function with the same signature that runs under this policy.
    pub fn wrap<A, T, F, Fut>(self, op: F) -> impl Fn(A) -> RetryFuture<T, E>
    where
        A: Clone + Send + Sync + 'static,
        T: Send + 'static,
        E: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let policy = Arc::new(self);
        let op = Arc::new(op);
        move |arg: A| -> RetryFuture<T, E> {
            let policy = Arc::clone(&policy);
            let op = Arc::clone(&op);
            Box::pin(async move { policy.call(|| op(arg.clone())).await })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::resilience::circuit_breaker::{CircuitBreakerConfig, CircuitState};

    #[test]
    fn test_calculate_delay_without_jitter() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(config.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(3), Duration::from_secs(8));
        assert_eq!(config.calculate_delay(10), Duration::from_secs(60));
        assert_eq!(config.calculate_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_calculate_delay_jitter_bounds() {
        let config = RetryConfig::default();
        for _ in 0..200 {
            let delay = config.calculate_delay(1).as_secs_f64();
            assert!((1.0..3.0).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[test]
    fn test_presets() {
        let embedding = RetryConfig::embedding_service();
        assert_eq!(embedding.max_attempts, 3);
        assert_eq!(embedding.initial_delay, Duration::from_secs(1));
        assert_eq!(embedding.max_delay, Duration::from_secs(30));

        let store = RetryConfig::vector_store();
        assert_eq!(store.initial_delay, Duration::from_millis(500));
        assert_eq!(store.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_exhaustion_returns_last_error() {
        let policy = RetryPolicy::<HalberdError>::new(RetryConfig::immediate(3));
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy.call(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(HalberdError::timeout(format!("attempt {n}")))
        });

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().to_string(), "Timeout: attempt 3");
    }

    #[test]
    fn test_non_retryable_returns_immediately() {
        let policy = RetryPolicy::<HalberdError>::transient(RetryConfig::immediate(5));
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy.call(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(HalberdError::invalid_argument("bad"))
        });
        assert!(matches!(result, Err(HalberdError::InvalidArgument(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exhaustion_counts_one_breaker_failure() {
        let breaker = Arc::new(CircuitBreaker::new("dep", CircuitBreakerConfig::default()));
        let policy = RetryPolicy::<HalberdError>::new(RetryConfig::immediate(3))
            .with_circuit_breaker(Arc::clone(&breaker));

        let _: Result<()> = policy.call(|| Err(HalberdError::embedding("down")));
        assert_eq!(breaker.snapshot().failure_count, 1);
    }

    #[test]
    fn test_retry_metrics() {
        let metrics = MetricsCollector::shared();
        let policy = RetryPolicy::<HalberdError>::new(RetryConfig::immediate(3))
            .named("embedding")
            .with_metrics(Arc::clone(&metrics));

        let _: Result<()> = policy.call(|| Err(HalberdError::embedding("down")));

        assert_eq!(metrics.counter(RETRY_ATTEMPTS, &[("policy", "embedding"), ("attempt", "1")]), 1);
        assert_eq!(metrics.counter(RETRY_ATTEMPTS, &[("policy", "embedding"), ("attempt", "2")]), 1);
        assert_eq!(metrics.snapshot().counter_total(RETRY_ATTEMPTS), 2);
        assert_eq!(metrics.counter(RETRY_EXHAUSTED, &[("policy", "embedding")]), 1);

        let ok: Result<u8> = policy.call(|| Ok(1));
        assert_eq!(ok.unwrap(), 1);
        assert_eq!(metrics.counter(RETRY_EXHAUSTED, &[("policy", "embedding")]), 1);
    }

    #[test]
    fn test_policy_name_defaults_to_breaker() {
        let breaker = Arc::new(CircuitBreaker::new("vector_store", CircuitBreakerConfig::default()));
        let policy = RetryPolicy::<HalberdError>::new(RetryConfig::immediate(1)).with_circuit_breaker(breaker);

        let _: Result<()> = policy.call(|| Err(HalberdError::timeout("slow")));
        assert_eq!(policy.metrics().counter(RETRY_EXHAUSTED, &[("policy", "vector_store")]), 1);
        assert!(format!("{policy:?}").contains("vector_store"));
    }

    #[test]
    fn test_open_breaker_skips_call() {
        let breaker = Arc::new(CircuitBreaker::new(
            "dep",
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
        ));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        let policy = RetryPolicy::<HalberdError>::new(RetryConfig::immediate(3)).with_circuit_breaker(breaker);
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy.call(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wrap_keeps_signature() {
        let policy = RetryPolicy::<HalberdError>::new(RetryConfig::immediate(2));
        let flaky = AtomicU32::new(0);
        let double = policy.wrap(|x: &i32| {
            if flaky.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(HalberdError::timeout("first call fails"))
            } else {
                Ok(x * 2)
            }
        });
        assert_eq!(double(&21).unwrap(), 42);
        assert_eq!(double(&5).unwrap(), 10);
    }

    #[tokio::test]
    async fn test_async_retry_succeeds() {
        let policy = AsyncRetryPolicy::<HalberdError>::transient(RetryConfig::immediate(3));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let value = policy
            .call(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(HalberdError::rate_limit("429"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_async_wrap() {
        let policy = AsyncRetryPolicy::<HalberdError>::new(RetryConfig::immediate(1));
        let upper = policy.wrap(|s: String| async move {
            if s.is_empty() {
                Err(HalberdError::invalid_argument("empty"))
            } else {
                Ok(s.to_uppercase())
            }
        });
        assert_eq!(upper("abc".to_string()).await.unwrap(), "ABC");
        assert!(upper(String::new()).await.is_err());
    }
}
