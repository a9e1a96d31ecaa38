//! The environment boundary.
//!
//! Simulators, task generators, and skill libraries live outside this
//! crate. The planner only needs the surface declared here: a pure
//! transition function plus the declared symbolic vocabulary.

use std::collections::BTreeSet;

use crate::model::{Action, BoxSpace, ParameterizedOption, Predicate, State, Task, Type};

/// A pure transition function: returns the successor state, never mutating
/// the input.
pub type Simulator = dyn Fn(&State, &Action) -> State;

/// The interface an environment exposes to the learning and planning core.
pub trait Environment {
    /// Apply an action to a state, returning the successor.
    fn simulate(&self, state: &State, action: &Action) -> State;

    /// Declared predicates.
    fn predicates(&self) -> BTreeSet<Predicate>;

    /// Declared object types.
    fn types(&self) -> Vec<Type>;

    /// Declared parameterized options (skills).
    fn options(&self) -> Vec<ParameterizedOption>;

    /// Bounds on the continuous action vector.
    fn action_space(&self) -> BoxSpace;

    /// Tasks for learning.
    fn train_tasks(&self) -> Vec<Task>;

    /// Tasks for evaluation.
    fn test_tasks(&self) -> Vec<Task>;
}
