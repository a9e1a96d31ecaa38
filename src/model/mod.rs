//! Core data model: typed objects, continuous states, symbolic predicates,
//! parameterized options, STRIPS operators, and trajectories.

pub mod operator;
pub mod option;
pub mod predicate;
pub mod state;
pub mod trajectory;

pub use operator::{all_ground_nsrts, GroundNsrt, GroundOperator, Nsrt, Sampler, StripsOperator};
pub use option::{BoxSpace, GroundedOption, ParameterizedOption};
pub use predicate::{
    abstract_state, create_new_variables, get_object_combinations, Classifier, GroundAtom,
    LiftedAtom, Predicate, Variable,
};
pub use state::{Action, Object, State, Type};
pub use trajectory::{Dataset, LowLevelTrajectory, Segment, Task};
