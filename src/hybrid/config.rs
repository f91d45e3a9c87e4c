//! Configuration for hybrid search.
//!
//! # Examples
//!
//! ```
//! use halberd::hybrid::config::{DistancePolicy, HybridSearchConfig};
//!
//! let config = HybridSearchConfig::default();
//! assert_eq!(config.alpha, 0.5);
//! assert_eq!(config.rrf_k, 60);
//! assert_eq!(config.distance_policy, DistancePolicy::Clamp);
//!
//! // Favor semantic matches.
//! let semantic_focused = HybridSearchConfig { alpha: 0.8, ..HybridSearchConfig::default() };
//! semantic_focused.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{HalberdError, Result};

/// How distances outside `[0, 1]` from the semantic searcher are handled.
///
/// Non-finite distances are rejected under every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistancePolicy {
    /// Clamp into `[0, 1]`.
    #[default]
    Clamp,
    /// Fail the search with [`HalberdError::InvalidArgument`].
    Reject,
}

impl DistancePolicy {
    /// Apply the policy to one distance.
    pub fn apply(self, distance: f64) -> Result<f64> {
        if !distance.is_finite() {
            return Err(HalberdError::invalid_argument(format!(
                "semantic distance {distance} is not finite"
            )));
        }
        match self {
            DistancePolicy::Clamp => Ok(distance.clamp(0.0, 1.0)),
            DistancePolicy::Reject if (0.0..=1.0).contains(&distance) => Ok(distance),
            DistancePolicy::Reject => Err(HalberdError::invalid_argument(format!(
                "semantic distance {distance} is outside [0, 1]"
            ))),
        }
    }
}

/// Parameters of the fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSearchConfig {
    /// Weight of the semantic list, in `[0, 1]`; the keyword list gets `1 - alpha`.
    pub alpha: f64,
    /// RRF damping constant.
    pub rrf_k: u32,
    /// Final result count used by `search_default`.
    pub default_k: usize,
    /// Candidates requested from the semantic searcher by `search_default`.
    pub semantic_k: usize,
    /// Candidates requested from the keyword index by `search_default`.
    pub keyword_k: usize,
    pub distance_policy: DistancePolicy,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        HybridSearchConfig {
            alpha: 0.5,
            rrf_k: 60,
            default_k: 5,
            semantic_k: 10,
            keyword_k: 10,
            distance_policy: DistancePolicy::Clamp,
        }
    }
}

impl HybridSearchConfig {
    /// Reject `alpha` outside `[0, 1]` (including NaN).
    pub fn validate(&self) -> Result<()> {
        if !self.alpha.is_finite() || !(0.0..=1.0).contains(&self.alpha) {
            return Err(HalberdError::config(format!(
                "hybrid.alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_alpha() {
        for alpha in [0.0, 0.3, 1.0] {
            HybridSearchConfig { alpha, ..Default::default() }.validate().unwrap();
        }
        for alpha in [-0.1, 1.01, f64::NAN, f64::INFINITY] {
            assert!(HybridSearchConfig { alpha, ..Default::default() }.validate().is_err());
        }
    }

    #[test]
    fn test_distance_policy() {
        assert_eq!(DistancePolicy::Clamp.apply(1.7).unwrap(), 1.0);
        assert_eq!(DistancePolicy::Clamp.apply(-0.2).unwrap(), 0.0);
        assert_eq!(DistancePolicy::Reject.apply(0.25).unwrap(), 0.25);
        assert!(DistancePolicy::Reject.apply(1.2).is_err());
        assert!(DistancePolicy::Clamp.apply(f64::NAN).is_err());
    }

    #[test]
    fn test_serde_policy_name() {
        let config: HybridSearchConfig = serde_json::from_str(r#"{"distance_policy": "reject"}"#).unwrap();
        assert_eq!(config.distance_policy, DistancePolicy::Reject);
        assert_eq!(config.rrf_k, 60);
    }
}
