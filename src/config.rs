//! Configuration for the sampling drivers.
//!
//! Each driver takes its config struct at construction time; the demo CLI can
//! load a [`CanopyConfig`] from a JSON file and falls back to the defaults
//! below otherwise.

use serde::{Deserialize, Serialize};

use crate::error::RolloutError;

/// Failure-handling shared by all drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Catch agent failures and end only the affected trajectory or branch
    /// (default: true). When false, an agent failure aborts the whole
    /// sampling call.
    pub catch_agent_failures: bool,
    /// Same policy for environment failures (default: true).
    pub catch_env_failures: bool,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            catch_agent_failures: true,
            catch_env_failures: true,
        }
    }
}

impl RolloutConfig {
    /// Whether a driver configured with these flags catches `err` instead of
    /// propagating it. Tree contract violations are never caught.
    pub(crate) fn catches(&self, err: &RolloutError) -> bool {
        match err {
            RolloutError::Agent { .. } => self.catch_agent_failures,
            RolloutError::Env { .. } => self.catch_env_failures,
            RolloutError::Tree(_) => false,
        }
    }
}

/// Tree-search driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSearchConfig {
    /// Children spawned per node (default: 2).
    pub branching_factor: usize,
    /// Global cap on concurrent node expansions (default: 8).
    pub concurrency_limit: usize,
    /// Stop expanding a branch once its own reward meets this threshold
    /// (default: none).
    pub target_reward: Option<f64>,
    pub rollout: RolloutConfig,
}

impl Default for TreeSearchConfig {
    fn default() -> Self {
        Self {
            branching_factor: 2,
            concurrency_limit: 8,
            target_reward: None,
            rollout: RolloutConfig::default(),
        }
    }
}

/// Beam-search driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamSearchConfig {
    /// Maximum number of live beams per starting environment (default: 4).
    pub beam_width: usize,
    /// Candidate continuations spawned per live beam each round (default: 2).
    pub samples_per_beam: usize,
    pub rollout: RolloutConfig,
}

impl Default for BeamSearchConfig {
    fn default() -> Self {
        Self {
            beam_width: 4,
            samples_per_beam: 2,
            rollout: RolloutConfig::default(),
        }
    }
}

/// Complete configuration for the demo CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanopyConfig {
    pub sample: RolloutConfig,
    pub tree: TreeSearchConfig,
    pub beam: BeamSearchConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = CanopyConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let parsed: CanopyConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.tree.branching_factor, 2);
        assert_eq!(parsed.beam.beam_width, 4);
        assert!(parsed.sample.catch_agent_failures);
    }
}
