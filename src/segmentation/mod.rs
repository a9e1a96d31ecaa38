//! Trajectory segmentation.
//!
//! Splits a low-level state/action trajectory into [`Segment`]s, each
//! covering one continuous skill invocation. Two strategies: split where
//! the acting option changes, or split where the symbolic atom set changes.

use std::collections::BTreeSet;

use crate::model::{GroundAtom, LowLevelTrajectory, Segment};
use crate::{Error, Result};

/// Segment a trajectory with the named strategy.
///
/// `atom_sequence` must hold the abstract state for every trajectory state.
/// Unknown strategy names fail with [`Error::NotImplemented`].
pub fn segment_trajectory(
    trajectory: &LowLevelTrajectory,
    atom_sequence: &[BTreeSet<GroundAtom>],
    strategy: &str,
) -> Result<Vec<Segment>> {
    assert_eq!(
        trajectory.states.len(),
        atom_sequence.len(),
        "one atom set per trajectory state"
    );
    match strategy {
        "option_changes" => Ok(segment_with_option_changes(trajectory, atom_sequence)),
        "atom_changes" => Ok(segment_with_atom_changes(trajectory, atom_sequence)),
        other => Err(Error::NotImplemented(format!(
            "unknown segmenter: {other}"
        ))),
    }
}

/// Split where the acting option's identity or parameters change, or where
/// the acting option terminates in the resulting state.
///
/// Every action must carry an option tag. A trailing run whose option never
/// terminates by the final state is discarded.
fn segment_with_option_changes(
    trajectory: &LowLevelTrajectory,
    atom_sequence: &[BTreeSet<GroundAtom>],
) -> Vec<Segment> {
    segment_with_switch(trajectory, atom_sequence, |t| {
        let option = trajectory.actions[t]
            .option()
            .expect("option_changes segmenter requires option-annotated actions");
        if option.terminal(&trajectory.states[t + 1]) {
            return true;
        }
        if t + 1 == trajectory.actions.len() {
            // Last action: only termination closes the segment.
            return false;
        }
        let next = trajectory.actions[t + 1]
            .option()
            .expect("option_changes segmenter requires option-annotated actions");
        option != next
    })
}

/// Split exactly where consecutive atom sets differ. A trajectory whose
/// atoms never change produces zero segments.
fn segment_with_atom_changes(
    trajectory: &LowLevelTrajectory,
    atom_sequence: &[BTreeSet<GroundAtom>],
) -> Vec<Segment> {
    segment_with_switch(trajectory, atom_sequence, |t| {
        atom_sequence[t] != atom_sequence[t + 1]
    })
}

/// Shared splitting loop: walk the transitions, closing a segment whenever
/// the switch function fires. A trailing run that never switches is not
/// emitted.
fn segment_with_switch(
    trajectory: &LowLevelTrajectory,
    atom_sequence: &[BTreeSet<GroundAtom>],
    switch: impl Fn(usize) -> bool,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut seg_start = 0;
    for t in 0..trajectory.actions.len() {
        if !switch(t) {
            continue;
        }
        let states = trajectory.states[seg_start..=t + 1].to_vec();
        let actions = trajectory.actions[seg_start..=t].to_vec();
        let option = trajectory.actions[t].option().cloned();
        segments.push(Segment::new(
            states,
            actions,
            atom_sequence[seg_start].clone(),
            atom_sequence[t + 1].clone(),
            option,
        ));
        seg_start = t + 1;
    }
    segments
}
