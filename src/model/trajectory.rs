//! Trajectories, segments, datasets, and tasks.

use std::collections::BTreeSet;

use crate::model::option::GroundedOption;
use crate::model::predicate::GroundAtom;
use crate::model::state::{Action, Object, State};

/// A raw state/action trajectory collected from the environment.
#[derive(Debug, Clone)]
pub struct LowLevelTrajectory {
    /// Visited states, one more than actions.
    pub states: Vec<State>,
    /// Executed actions.
    pub actions: Vec<Action>,
    /// Whether the trajectory is a demonstration.
    pub is_demo: bool,
    /// Index of the originating training task.
    pub train_task_idx: usize,
}

impl LowLevelTrajectory {
    /// Create a trajectory, checking the states/actions length invariant.
    pub fn new(states: Vec<State>, actions: Vec<Action>, is_demo: bool, train_task_idx: usize) -> Self {
        assert_eq!(
            states.len(),
            actions.len() + 1,
            "trajectory must have one more state than actions"
        );
        Self {
            states,
            actions,
            is_demo,
            train_task_idx,
        }
    }
}

/// An ordered collection of trajectories used for learning.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// The trajectories, in collection order.
    pub trajectories: Vec<LowLevelTrajectory>,
}

impl Dataset {
    /// Create a dataset.
    pub fn new(trajectories: Vec<LowLevelTrajectory>) -> Self {
        Self { trajectories }
    }
}

/// A planning problem: an initial state and a goal atom set.
#[derive(Debug, Clone)]
pub struct Task {
    /// Initial state.
    pub init: State,
    /// Atoms that must all hold on completion.
    pub goal: BTreeSet<GroundAtom>,
}

impl Task {
    /// Create a task.
    pub fn new(init: State, goal: BTreeSet<GroundAtom>) -> Self {
        Self { init, goal }
    }

    /// Whether every goal atom holds in the given state.
    pub fn goal_holds(&self, state: &State) -> bool {
        self.goal.iter().all(|atom| atom.holds(state))
    }
}

/// A contiguous sub-trajectory attributed to one continuous skill
/// invocation, annotated with the symbolic atoms before and after.
#[derive(Debug, Clone)]
pub struct Segment {
    /// States spanning the segment, one more than actions.
    pub states: Vec<State>,
    /// Actions within the segment; never empty.
    pub actions: Vec<Action>,
    /// Atoms true in the first state.
    pub init_atoms: BTreeSet<GroundAtom>,
    /// Atoms true in the last state.
    pub final_atoms: BTreeSet<GroundAtom>,
    option: Option<GroundedOption>,
}

impl Segment {
    /// Create a segment, checking the shape invariants.
    pub fn new(
        states: Vec<State>,
        actions: Vec<Action>,
        init_atoms: BTreeSet<GroundAtom>,
        final_atoms: BTreeSet<GroundAtom>,
        option: Option<GroundedOption>,
    ) -> Self {
        assert!(!actions.is_empty(), "segment must contain at least one action");
        assert_eq!(
            states.len(),
            actions.len() + 1,
            "segment must have one more state than actions"
        );
        Self {
            states,
            actions,
            init_atoms,
            final_atoms,
            option,
        }
    }

    /// Atoms gained across the segment.
    pub fn add_effects(&self) -> BTreeSet<GroundAtom> {
        self.final_atoms.difference(&self.init_atoms).cloned().collect()
    }

    /// Atoms lost across the segment.
    pub fn delete_effects(&self) -> BTreeSet<GroundAtom> {
        self.init_atoms.difference(&self.final_atoms).cloned().collect()
    }

    /// Whether the acting option is known.
    pub fn has_option(&self) -> bool {
        self.option.is_some()
    }

    /// The acting option, if known.
    pub fn option(&self) -> Option<&GroundedOption> {
        self.option.as_ref()
    }

    /// All objects present in the segment's states.
    pub fn objects(&self) -> Vec<Object> {
        self.states[0].objects().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::predicate::{Classifier, Predicate};
    use crate::model::state::{Object, Type};

    fn fixture() -> (Object, Predicate, State, State) {
        let ty = Type::new("cup", &["level"]);
        let cup = Object::new("cup0", ty.clone());
        let pred = Predicate::new(
            "Full",
            vec![ty],
            Classifier::new(|s, o| s.get(&o[0], "level") > 0.5),
        );
        let empty = State::new([(cup.clone(), vec![0.0])]);
        let full = State::new([(cup.clone(), vec![1.0])]);
        (cup, pred, empty, full)
    }

    #[test]
    fn test_segment_effects_from_atom_diff() {
        let (cup, pred, empty, full) = fixture();
        let atom = GroundAtom::new(pred, vec![cup]);
        let segment = Segment::new(
            vec![empty, full],
            vec![Action::new(vec![1.0])],
            BTreeSet::new(),
            BTreeSet::from([atom.clone()]),
            None,
        );
        assert_eq!(segment.add_effects(), BTreeSet::from([atom]));
        assert!(segment.delete_effects().is_empty());
    }

    #[test]
    #[should_panic(expected = "at least one action")]
    fn test_segment_rejects_empty_actions() {
        let (_, _, empty, _) = fixture();
        let _ = Segment::new(vec![empty], vec![], BTreeSet::new(), BTreeSet::new(), None);
    }

    #[test]
    fn test_task_goal_holds() {
        let (cup, pred, empty, full) = fixture();
        let atom = GroundAtom::new(pred, vec![cup]);
        let task = Task::new(empty.clone(), BTreeSet::from([atom]));
        assert!(!task.goal_holds(&empty));
        assert!(task.goal_holds(&full));
    }

    #[test]
    #[should_panic(expected = "one more state than actions")]
    fn test_trajectory_shape_invariant() {
        let (_, _, empty, full) = fixture();
        let _ = LowLevelTrajectory::new(vec![empty, full], vec![], true, 0);
    }
}
