//! A learning-based estimator keeping per-operator refinement statistics.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{GroundAtom, GroundNsrt, State};
use crate::refinement::{RefinementEstimator, RefinementRecord};
use crate::Result;

/// Accumulated refinement statistics for one operator name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OpStats {
    /// Samples attributed to this operator across all records.
    samples: f64,
    /// Skeleton attempts this operator appeared in.
    attempts: f64,
    /// Attempts that failed to refine.
    failures: f64,
}

/// Estimates a skeleton's cost as the sum of its operators' expected
/// sample counts, inflated by their observed failure rates. Operators with
/// no data fall back to a configured default cost.
pub struct TabularRefinementEstimator {
    stats: BTreeMap<String, OpStats>,
    default_cost: f64,
    failure_penalty: f64,
}

impl TabularRefinementEstimator {
    /// Create an untrained estimator.
    pub fn new(default_cost: f64, failure_penalty: f64) -> Self {
        Self {
            stats: BTreeMap::new(),
            default_cost,
            failure_penalty,
        }
    }

    fn step_cost(&self, op_name: &str) -> f64 {
        match self.stats.get(op_name) {
            Some(stats) if stats.attempts > 0.0 => {
                let avg_samples = stats.samples / stats.attempts;
                let failure_rate = stats.failures / stats.attempts;
                avg_samples * (1.0 + self.failure_penalty * failure_rate)
            }
            _ => self.default_cost,
        }
    }
}

impl RefinementEstimator for TabularRefinementEstimator {
    fn name(&self) -> &'static str {
        "tabular"
    }

    fn is_learning_based(&self) -> bool {
        true
    }

    fn get_cost(
        &self,
        _initial_state: &State,
        skeleton: &[GroundNsrt],
        _atoms_sequence: &[BTreeSet<GroundAtom>],
    ) -> f64 {
        skeleton.iter().map(|step| self.step_cost(step.name())).sum()
    }

    fn train(&mut self, data: &[RefinementRecord]) -> Result<()> {
        for record in data {
            if record.op_names.is_empty() {
                continue;
            }
            // Samples are attributed evenly; the planner does not report a
            // per-step breakdown.
            let share = record.num_samples as f64 / record.op_names.len() as f64;
            for name in &record.op_names {
                let stats = self.stats.entry(name.clone()).or_default();
                stats.samples += share;
                stats.attempts += 1.0;
                if !record.succeeded {
                    stats.failures += 1.0;
                }
            }
        }
        Ok(())
    }

    fn save_state(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.stats)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn load_state(&mut self, path: &Path) -> Result<()> {
        let json = std::fs::read_to_string(path)?;
        self.stats = serde_json::from_str(&json)?;
        Ok(())
    }
}
