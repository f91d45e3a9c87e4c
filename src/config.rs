//! Aggregate configuration for the library and the `halberd` binary.
//!
//! Every section has a `Default` matching the production defaults, so a
//! configuration file only needs to name the values it changes:
//!
//! ```
//! use halberd::config::HalberdConfig;
//!
//! let config: HalberdConfig = serde_json::from_str(r#"{"hybrid": {"alpha": 0.7}}"#).unwrap();
//! assert_eq!(config.hybrid.alpha, 0.7);
//! assert_eq!(config.hybrid.rrf_k, 60);
//! config.validate().unwrap();
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::error::{HalberdError, Result};
use crate::hybrid::config::HybridSearchConfig;
use crate::lexical::bm25::Bm25Config;
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::retry::RetryConfig;

/// Serde adapter storing a [`std::time::Duration`] as fractional seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| de::Error::custom(format!("invalid duration in seconds: {secs}")))
    }
}

/// Settings of the representation (embedding) provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Vector dimension of the built-in hashing embedder.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig { dimension: 256 }
    }
}

/// Retry settings per external dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Policy around representation generation.
    pub embedding: RetryConfig,
    /// Policy around semantic search.
    pub vector_store: RetryConfig,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            embedding: RetryConfig::embedding_service(),
            vector_store: RetryConfig::vector_store(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HalberdConfig {
    pub bm25: Bm25Config,
    pub hybrid: HybridSearchConfig,
    pub cache: CacheConfig,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerConfig,
    pub embedding: EmbeddingConfig,
}

impl HalberdConfig {
    /// Load a JSON configuration file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            HalberdError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: HalberdConfig = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(event = "config.loaded", path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.bm25.validate()?;
        self.hybrid.validate()?;
        self.cache.validate()?;
        self.retry.embedding.validate()?;
        self.retry.vector_store.validate()?;
        self.circuit_breaker.validate()?;
        if self.embedding.dimension == 0 {
            return Err(HalberdError::config("embedding.dimension must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HalberdConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bm25.k1, 1.5);
        assert_eq!(config.bm25.b, 0.75);
        assert_eq!(config.cache.l1.max_size, 10_000);
        assert_eq!(config.cache.l2.default_ttl, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.retry.embedding.max_delay, Duration::from_secs(30));
        assert_eq!(config.retry.vector_store.initial_delay, Duration::from_millis(500));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_durations_as_seconds() {
        let config: HalberdConfig =
            serde_json::from_str(r#"{"cache": {"l1": {"default_ttl": 1.5}}}"#).unwrap();
        assert_eq!(config.cache.l1.default_ttl, Duration::from_millis(1500));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["cache"]["l1"]["default_ttl"], 1.5);
        assert_eq!(json["circuit_breaker"]["timeout"], 30.0);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result: std::result::Result<HalberdConfig, _> =
            serde_json::from_str(r#"{"circuit_breaker": {"timeout": -1.0}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"hybrid": {{"alpha": 0.25, "rrf_k": 10}}}}"#).unwrap();

        let config = HalberdConfig::from_file(file.path()).unwrap();
        assert_eq!(config.hybrid.alpha, 0.25);
        assert_eq!(config.hybrid.rrf_k, 10);
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"hybrid": {{"alpha": 1.5}}}}"#).unwrap();
        assert!(HalberdConfig::from_file(file.path()).is_err());

        assert!(HalberdConfig::from_file("/definitely/not/here.json").is_err());
    }
}
