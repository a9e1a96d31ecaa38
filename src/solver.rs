//! Task-level driver: owns the learned models and issues seeded,
//! repeatable planning calls.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::learning::persist::{load_nsrts, save_nsrts, Registries};
use crate::learning::{learn_nsrts, NsrtLearningOutcome};
use crate::model::{Action, Dataset, Nsrt, Predicate, Sampler, State, Task};
use crate::planning::{sesame_plan, Policy};
use crate::refinement::{create_refinement_estimator, RefinementEstimator, RefinementRecord};
use crate::{Error, Result};

/// Owns predicates, learned NSRTs, a refinement estimator, and the seed
/// discipline that makes repeated solve calls reproducible.
pub struct TampSolver {
    predicates: BTreeSet<Predicate>,
    nsrts: Vec<Nsrt>,
    estimator: Box<dyn RefinementEstimator>,
    config: Config,
    seed: u64,
    num_calls: u64,
    refinement_records: Vec<RefinementRecord>,
}

impl TampSolver {
    /// Create a solver with no operators yet.
    ///
    /// Validates the configuration and constructs the configured
    /// estimator; unknown names fail fast.
    pub fn new(predicates: BTreeSet<Predicate>, config: Config, seed: u64) -> Result<Self> {
        config.validate()?;
        let estimator = create_refinement_estimator(&config.refinement.estimator, &config.refinement)?;
        Ok(Self {
            predicates,
            nsrts: Vec::new(),
            estimator,
            config,
            seed,
            num_calls: 0,
            refinement_records: Vec::new(),
        })
    }

    /// Replace the operator set, e.g. with hand-written oracle NSRTs.
    pub fn set_nsrts(&mut self, nsrts: Vec<Nsrt>) {
        self.nsrts = nsrts;
    }

    /// The current operator set.
    pub fn nsrts(&self) -> &[Nsrt] {
        &self.nsrts
    }

    /// Learn NSRTs from a dataset and adopt them.
    pub fn learn(
        &mut self,
        dataset: &Dataset,
        oracle_samplers: &BTreeMap<String, Sampler>,
    ) -> Result<NsrtLearningOutcome> {
        let outcome = learn_nsrts(
            dataset,
            &self.predicates,
            oracle_samplers,
            &self.config.learning,
        )?;
        self.nsrts = outcome.nsrts.clone();
        Ok(outcome)
    }

    /// Solve one task within the timeout, returning a consumable policy.
    ///
    /// Each call derives its seed from the base seed plus a call counter,
    /// so an identical sequence of calls replays identically. Refinement
    /// outcomes are accumulated for estimator training whether planning
    /// succeeds or fails.
    pub fn solve(
        &mut self,
        task: &Task,
        simulate: &dyn Fn(&State, &Action) -> State,
        timeout: Duration,
    ) -> Result<Policy> {
        self.num_calls += 1;
        let seed = self.seed + self.num_calls;
        let result = sesame_plan(
            task,
            simulate,
            &self.nsrts,
            &self.predicates,
            self.estimator.as_ref(),
            &self.config.planning,
            timeout,
            seed,
        );
        match result {
            Ok(report) => {
                self.refinement_records
                    .extend(report.refinement_records.iter().cloned());
                Ok(Policy::new(report.plan))
            }
            Err(Error::Timeout(info)) => {
                self.refinement_records
                    .extend(info.refinement_records.iter().cloned());
                Err(Error::Timeout(info))
            }
            Err(Error::Planning(info)) => {
                self.refinement_records
                    .extend(info.refinement_records.iter().cloned());
                Err(Error::Planning(info))
            }
            Err(other) => Err(other),
        }
    }

    /// Refinement outcomes accumulated across solve calls.
    pub fn refinement_records(&self) -> &[RefinementRecord] {
        &self.refinement_records
    }

    /// Train the estimator on the accumulated refinement outcomes.
    pub fn train_estimator(&mut self) -> Result<()> {
        info!(
            num_records = self.refinement_records.len(),
            "training refinement estimator"
        );
        self.estimator.train(&self.refinement_records)
    }

    /// Persist learned operators (and estimator state, when the estimator
    /// learns) into a directory.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        save_nsrts(&dir.join("nsrts.json"), &self.nsrts)?;
        if self.estimator.is_learning_based() {
            self.estimator.save_state(&dir.join("estimator.json"))?;
        }
        Ok(())
    }

    /// Restore learned operators (and estimator state, when the estimator
    /// learns) from a directory written by [`TampSolver::save`].
    pub fn load(&mut self, dir: &Path, registries: &Registries<'_>) -> Result<()> {
        self.nsrts = load_nsrts(&dir.join("nsrts.json"), registries)?;
        if self.estimator.is_learning_based() {
            self.estimator.load_state(&dir.join("estimator.json"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = Config::default();
        config.planning.max_samples_per_step = 0;
        assert!(matches!(
            TampSolver::new(BTreeSet::new(), config, 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_new_rejects_unknown_estimator() {
        let mut config = Config::default();
        config.refinement.estimator = "gnn".to_string();
        assert!(matches!(
            TampSolver::new(BTreeSet::new(), config, 0),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn test_set_nsrts_replaces_operators() {
        let mut solver =
            TampSolver::new(BTreeSet::new(), Config::default(), 0).expect("solver");
        assert!(solver.nsrts().is_empty());
        solver.set_nsrts(vec![]);
        assert!(solver.nsrts().is_empty());
    }
}
