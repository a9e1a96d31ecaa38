//! Refinement cost estimation.
//!
//! Skeleton search yields more goal-satisfying skeletons than the planner
//! can afford to refine; an estimator predicts which skeletons will refine
//! cheaply so they are tried first. Estimators are pure scorers: they
//! never mutate the skeleton or atom inputs.

pub mod tabular;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{GroundAtom, GroundNsrt, State};
use crate::{Error, Result};

pub use self::tabular::TabularRefinementEstimator;

/// The outcome of refining one skeleton, logged by the planner and used as
/// training data by learning-based estimators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementRecord {
    /// Operator names along the skeleton, in order.
    pub op_names: Vec<String>,
    /// Whether refinement produced a full plan.
    pub succeeded: bool,
    /// Continuous samples spent on this skeleton.
    pub num_samples: u64,
}

/// Scores skeletons by expected refinement cost; lower is cheaper.
pub trait RefinementEstimator {
    /// Estimator name.
    fn name(&self) -> &'static str;

    /// Whether the estimator trains on logged refinement outcomes.
    fn is_learning_based(&self) -> bool;

    /// Estimate the refinement cost of a skeleton. Must not mutate its
    /// inputs; scoring is purely functional.
    fn get_cost(
        &self,
        initial_state: &State,
        skeleton: &[GroundNsrt],
        atoms_sequence: &[BTreeSet<GroundAtom>],
    ) -> f64;

    /// Train on logged refinement outcomes.
    fn train(&mut self, _data: &[RefinementRecord]) -> Result<()> {
        Err(Error::NotImplemented(format!(
            "{} does not train",
            self.name()
        )))
    }

    /// Persist training state to a file.
    fn save_state(&self, _path: &Path) -> Result<()> {
        Err(Error::NotImplemented(format!(
            "{} has no state to save",
            self.name()
        )))
    }

    /// Restore training state from a file.
    fn load_state(&mut self, _path: &Path) -> Result<()> {
        Err(Error::NotImplemented(format!(
            "{} has no state to load",
            self.name()
        )))
    }
}

/// Create a refinement cost estimator by name.
pub fn create_refinement_estimator(
    name: &str,
    config: &crate::config::RefinementConfig,
) -> Result<Box<dyn RefinementEstimator>> {
    match name {
        "skeleton_length" => Ok(Box::new(SkeletonLengthEstimator)),
        "tabular" => Ok(Box::new(TabularRefinementEstimator::new(
            config.tabular_default_cost,
            config.tabular_failure_penalty,
        ))),
        other => Err(Error::NotImplemented(format!(
            "unknown refinement estimator: {other}"
        ))),
    }
}

/// The non-learning baseline: shorter skeletons refine first.
pub struct SkeletonLengthEstimator;

impl RefinementEstimator for SkeletonLengthEstimator {
    fn name(&self) -> &'static str {
        "skeleton_length"
    }

    fn is_learning_based(&self) -> bool {
        false
    }

    fn get_cost(
        &self,
        _initial_state: &State,
        skeleton: &[GroundNsrt],
        _atoms_sequence: &[BTreeSet<GroundAtom>],
    ) -> f64 {
        skeleton.len() as f64
    }
}
