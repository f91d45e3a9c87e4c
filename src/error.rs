//! Error types for the Halberd library.
//!
//! All fallible operations return [`HalberdError`] through the [`Result`] alias.
//! The enum separates *transient* dependency failures (which the resilience layer
//! may retry) from configuration and argument errors (which it never retries).
//!
//! # Examples
//!
//! ```
//! use halberd::error::{HalberdError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(HalberdError::invalid_argument("alpha must be within [0, 1]"))
//! }
//!
//! let err = example_operation().unwrap_err();
//! assert!(!err.is_transient());
//! ```

use std::io;

use thiserror::Error;

/// Signal raised when a circuit breaker rejects a call.
///
/// Kept as its own type so that generic resilience wrappers can require
/// `E: From<CircuitOpenError>` without knowing the caller's error enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("circuit breaker '{name}' is open")]
pub struct CircuitOpenError {
    /// Name of the dependency whose breaker rejected the call.
    pub name: String,
}

impl CircuitOpenError {
    /// Create a new breaker-open signal for the named dependency.
    pub fn new<S: Into<String>>(name: S) -> Self {
        CircuitOpenError { name: name.into() }
    }
}

/// The main error type for Halberd operations.
#[derive(Error, Debug)]
pub enum HalberdError {
    /// I/O errors (file operations, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary (bincode) serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Analysis-related errors (tokenization, filtering, etc.)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument passed by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure of the representation (embedding) provider
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Failure of the semantic search provider
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Upstream rate limiting
    #[error("Rate limited: {0}")]
    RateLimit(String),

    /// A circuit breaker rejected the call without invoking the dependency
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with HalberdError.
pub type Result<T> = std::result::Result<T, HalberdError>;

impl HalberdError {
    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        HalberdError::Analysis(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        HalberdError::Config(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        HalberdError::InvalidArgument(msg.into())
    }

    /// Create a new embedding provider error.
    pub fn embedding<S: Into<String>>(msg: S) -> Self {
        HalberdError::Embedding(msg.into())
    }

    /// Create a new vector store error.
    pub fn vector_store<S: Into<String>>(msg: S) -> Self {
        HalberdError::VectorStore(msg.into())
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        HalberdError::Timeout(msg.into())
    }

    /// Create a new rate limit error.
    pub fn rate_limit<S: Into<String>>(msg: S) -> Self {
        HalberdError::RateLimit(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        HalberdError::Other(msg.into())
    }

    /// Whether this error describes a transient dependency failure.
    ///
    /// Used as the default retry predicate. Breaker rejections are never
    /// transient from the retry loop's point of view.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HalberdError::Io(_)
                | HalberdError::Embedding(_)
                | HalberdError::VectorStore(_)
                | HalberdError::Timeout(_)
                | HalberdError::RateLimit(_)
        )
    }

    /// Whether this error is a circuit breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, HalberdError::CircuitOpen(_))
    }
}

impl From<bincode::Error> for HalberdError {
    fn from(err: bincode::Error) -> Self {
        HalberdError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = HalberdError::config("Test config error");
        assert_eq!(error.to_string(), "Configuration error: Test config error");

        let error = HalberdError::embedding("upstream unavailable");
        assert_eq!(error.to_string(), "Embedding error: upstream unavailable");

        let error = HalberdError::from(CircuitOpenError::new("openai"));
        assert_eq!(error.to_string(), "circuit breaker 'openai' is open");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let halberd_error = HalberdError::from(io_error);

        match halberd_error {
            HalberdError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(HalberdError::embedding("x").is_transient());
        assert!(HalberdError::vector_store("x").is_transient());
        assert!(HalberdError::timeout("x").is_transient());
        assert!(HalberdError::rate_limit("x").is_transient());

        assert!(!HalberdError::invalid_argument("x").is_transient());
        assert!(!HalberdError::config("x").is_transient());
        assert!(!HalberdError::from(CircuitOpenError::new("chromadb")).is_transient());
        assert!(HalberdError::from(CircuitOpenError::new("chromadb")).is_circuit_open());
    }
}
