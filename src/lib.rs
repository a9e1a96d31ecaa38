//! # TAMP Planner
//!
//! A bilevel task-and-motion planning library: learn symbolic operators
//! from continuous demonstration trajectories, then solve long-horizon
//! tasks by interleaving symbolic search with continuous parameter
//! sampling ("SeSamE": search, sample, execute).
//!
//! ## Overview
//!
//! The environment supplies a pure `simulate` function, declared predicates,
//! types, and parameterized options, plus tasks (initial state + goal
//! atoms). From demonstration trajectories this library segments continuous
//! experience into skill invocations, induces STRIPS-style operators with
//! continuous samplers (NSRTs), and plans with them: an A* search over
//! grounded-operator skeletons, each refined into concrete options by
//! sampling and validated against the simulator, with chronological
//! backtracking when sampling fails.
//!
//! ## Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`model`]: typed objects, states, predicates, options, operators
//! - [`segmentation`]: trajectory splitting into per-skill segments
//! - [`learning`]: STRIPS operator induction and sampler fitting
//! - [`planning`]: the SeSamE bilevel planner and execution policies
//! - [`refinement`]: refinement cost estimators that order skeleton search
//! - [`solver`]: task-level driver with seeded, repeatable solve calls
//! - [`config`]: explicit configuration threaded through constructors
//! - [`env`]: the environment boundary the core plans against
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │ Environment │───▶│  Segmenter  │───▶│   Operator  │───▶│   Bilevel   │
//! │ trajectories│    │             │    │   Learner   │    │   Planner   │
//! └─────────────┘    └─────────────┘    └─────────────┘    └─────────────┘
//!                                                                 │
//!                                                                 ▼
//!                                                          ┌─────────────┐
//!                                                          │   Policy    │
//!                                                          │ (execution) │
//!                                                          └─────────────┘
//! ```

pub mod config;
pub mod env;
pub mod learning;
pub mod model;
pub mod planning;
pub mod refinement;
pub mod segmentation;
pub mod solver;

// Re-export commonly used types
pub use config::Config;
pub use model::{
    Action, Dataset, GroundAtom, GroundNsrt, GroundedOption, LowLevelTrajectory, Nsrt, Object,
    ParameterizedOption, Predicate, Segment, State, StripsOperator, Task, Type,
};
pub use planning::{sesame_plan, FailureInfo, PartialRefinement, PlanningReport, TimeoutInfo};
pub use solver::TampSolver;

/// Result type alias for the planner library.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the planner library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration value; fail fast, not recoverable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An unknown strategy name was requested; fail fast.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Operator or sampler learning could not proceed.
    #[error("Learning error: {0}")]
    Learning(String),

    /// No skeleton refined into a plan; carries diagnostics and partial
    /// refinements so callers can fall back or train estimators.
    #[error("Planning failure: {0}")]
    Planning(planning::FailureInfo),

    /// The planning budget expired; carries whatever partial refinements
    /// were found before the deadline.
    #[error("Planning timeout: {0}")]
    Timeout(planning::TimeoutInfo),

    /// A policy was queried after its action queue emptied. Execution
    /// loops catch this as the normal end-of-plan signal.
    #[error("Plan exhausted")]
    PlanExhausted,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
