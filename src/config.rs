//! Configuration for the learning and planning pipeline.
//!
//! Every component takes its section explicitly; there is no global,
//! mutable settings object. Strategy names are validated by the factories
//! that consume them, numeric ranges by [`Config::validate`].

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Operator learning settings
    pub learning: LearnerConfig,
    /// Bilevel planner settings
    pub planning: PlannerConfig,
    /// Refinement cost estimation settings
    pub refinement: RefinementConfig,
}

/// Operator learning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Segmentation strategy ("option_changes" or "atom_changes")
    pub segmenter: String,
    /// STRIPS induction strategy
    pub strategy: String,
    /// Sampler learning strategy ("oracle", "random", or "gaussian")
    pub sampler_learner: String,
    /// Reward weight for segments an operator correctly covers
    pub true_pos_weight: f64,
    /// Penalty weight for segments an operator wrongly claims
    pub false_pos_weight: f64,
    /// Lower bound on fitted Gaussian standard deviations
    pub gaussian_std_floor: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            segmenter: "option_changes".to_string(),
            strategy: "cluster_and_intersect".to_string(),
            sampler_learner: "gaussian".to_string(),
            true_pos_weight: 10.0,
            false_pos_weight: 1.0,
            gaussian_std_floor: 1e-4,
        }
    }
}

/// Bilevel planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Task-planning heuristic ("hadd" or "goal_count")
    pub task_planning_heuristic: String,
    /// Maximum number of skeletons considered per solve call
    pub max_skeletons_optimized: usize,
    /// Sampling budget per skeleton step before backtracking
    pub max_samples_per_step: usize,
    /// Step budget when rolling an option forward to termination
    pub max_option_rollout_steps: usize,
    /// Reject tasks whose goal is not delete-relaxation reachable
    pub check_dr_reachable: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            task_planning_heuristic: "hadd".to_string(),
            max_skeletons_optimized: 8,
            max_samples_per_step: 10,
            max_option_rollout_steps: 100,
            check_dr_reachable: true,
        }
    }
}

/// Refinement cost estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Estimator name ("skeleton_length" or "tabular")
    pub estimator: String,
    /// Per-step cost assumed for operators with no training data
    pub tabular_default_cost: f64,
    /// Multiplier applied to observed failure rates
    pub tabular_failure_penalty: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            estimator: "skeleton_length".to_string(),
            tabular_default_cost: 1.0,
            tabular_failure_penalty: 10.0,
        }
    }
}

impl Config {
    /// Validate numeric ranges. Returns the first invalid field as a
    /// configuration error.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.learning.true_pos_weight < 0.0 || self.learning.false_pos_weight < 0.0 {
            return Err(crate::Error::Config(format!(
                "clustering weights must be >= 0, got {} and {}",
                self.learning.true_pos_weight, self.learning.false_pos_weight
            )));
        }
        if self.learning.gaussian_std_floor <= 0.0 {
            return Err(crate::Error::Config(format!(
                "gaussian_std_floor must be > 0, got {}",
                self.learning.gaussian_std_floor
            )));
        }
        if self.planning.max_skeletons_optimized == 0 {
            return Err(crate::Error::Config(
                "max_skeletons_optimized must be > 0".to_string(),
            ));
        }
        if self.planning.max_samples_per_step == 0 {
            return Err(crate::Error::Config(
                "max_samples_per_step must be > 0".to_string(),
            ));
        }
        if self.planning.max_option_rollout_steps == 0 {
            return Err(crate::Error::Config(
                "max_option_rollout_steps must be > 0".to_string(),
            ));
        }
        if self.refinement.tabular_default_cost < 0.0 {
            return Err(crate::Error::Config(format!(
                "tabular_default_cost must be >= 0, got {}",
                self.refinement.tabular_default_cost
            )));
        }
        if self.refinement.tabular_failure_penalty < 0.0 {
            return Err(crate::Error::Config(format!(
                "tabular_failure_penalty must be >= 0, got {}",
                self.refinement.tabular_failure_penalty
            )));
        }
        Ok(())
    }

    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), crate::Error> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
