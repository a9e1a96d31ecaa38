//! NSRT learning: abstract, segment, induce operators, fit samplers.
//!
//! The pipeline consumes a dataset of low-level trajectories plus the
//! declared predicate set and produces NSRTs: STRIPS operators bound to
//! options and continuous samplers. Learning is best-effort: segments
//! supported by no operator are logged and dropped, never fatal.

pub mod persist;
pub mod samplers;
pub mod strips;
pub mod unify;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::config::LearnerConfig;
use crate::model::{Dataset, Nsrt, Predicate, Sampler, Segment};
use crate::segmentation::segment_trajectory;
use crate::Result;

use self::samplers::create_sampler_learner;
use self::strips::learn_strips_operators;

/// Everything the learning pipeline produces.
#[derive(Debug)]
pub struct NsrtLearningOutcome {
    /// The learned NSRTs.
    pub nsrts: Vec<Nsrt>,
    /// Segments per source trajectory, in dataset order.
    pub segmented_trajs: Vec<Vec<Segment>>,
    /// For each segment (parallel to `segmented_trajs`), the index of the
    /// NSRT supporting it, or `None` when no operator covers it.
    pub segment_to_nsrt: Vec<Vec<Option<usize>>>,
}

/// Learn NSRTs from a dataset.
///
/// `oracle_samplers` maps option names to ground-truth samplers; it is
/// consulted only when the configured sampler learner is `"oracle"`.
pub fn learn_nsrts(
    dataset: &Dataset,
    predicates: &BTreeSet<Predicate>,
    oracle_samplers: &BTreeMap<String, Sampler>,
    config: &LearnerConfig,
) -> Result<NsrtLearningOutcome> {
    info!(
        num_trajectories = dataset.trajectories.len(),
        "learning NSRTs"
    );

    // Abstract every state, then segment every trajectory.
    let mut segmented_trajs: Vec<Vec<Segment>> = Vec::with_capacity(dataset.trajectories.len());
    for traj in &dataset.trajectories {
        let atom_sequence: Vec<_> = traj
            .states
            .iter()
            .map(|s| crate::model::abstract_state(s, predicates))
            .collect();
        segmented_trajs.push(segment_trajectory(traj, &atom_sequence, &config.segmenter)?);
    }

    // Induce operators over the flattened segment list.
    let segments: Vec<Segment> = segmented_trajs.iter().flatten().cloned().collect();
    let pnads = learn_strips_operators(&segments, config)?;

    // Fit one sampler per operator.
    let sampler_learner =
        create_sampler_learner(&config.sampler_learner, oracle_samplers, config)?;
    let mut nsrts = Vec::with_capacity(pnads.len());
    let mut flat_assignment: Vec<Option<usize>> = vec![None; segments.len()];
    for (nsrt_idx, pnad) in pnads.iter().enumerate() {
        let sampler = sampler_learner.learn(pnad, &segments)?;
        for entry in &pnad.datastore {
            flat_assignment[entry.segment] = Some(nsrt_idx);
        }
        nsrts.push(Nsrt::new(
            pnad.op.clone(),
            pnad.option.clone(),
            pnad.option_vars.clone(),
            sampler,
        ));
    }

    let uncovered = flat_assignment.iter().filter(|a| a.is_none()).count();
    if uncovered > 0 {
        warn!(
            uncovered,
            total = segments.len(),
            "segments not covered by any operator; dropping them"
        );
    }

    // Unflatten the assignment back to per-trajectory shape.
    let mut segment_to_nsrt = Vec::with_capacity(segmented_trajs.len());
    let mut offset = 0;
    for segs in &segmented_trajs {
        segment_to_nsrt.push(flat_assignment[offset..offset + segs.len()].to_vec());
        offset += segs.len();
    }

    info!(num_nsrts = nsrts.len(), "finished learning NSRTs");
    for nsrt in &nsrts {
        info!(%nsrt, "learned NSRT");
    }

    Ok(NsrtLearningOutcome {
        nsrts,
        segmented_trajs,
        segment_to_nsrt,
    })
}
