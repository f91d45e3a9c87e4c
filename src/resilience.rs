//! Retry-with-backoff and circuit breaking around external dependencies.
//!
//! A [`circuit_breaker::CircuitBreaker`] tracks the health of one named
//! dependency; a [`retry::RetryPolicy`] (blocking) or [`retry::AsyncRetryPolicy`]
//! (tokio) retries a fallible call and reports its outcome to an optional
//! breaker. Breakers are shared through a [`registry::CircuitBreakerRegistry`]
//! owned by the caller.

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

pub use crate::resilience::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use crate::resilience::registry::CircuitBreakerRegistry;
pub use crate::resilience::retry::{AsyncRetryPolicy, RetryConfig, RetryPolicy};
