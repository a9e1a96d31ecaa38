//! SeSamE bilevel planning: SEarch over operator skeletons, SAMple
//! continuous parameters, then Execute.
//!
//! The outer loop is an A* search over grounded-operator skeletons whose
//! effects chain from the initial atoms to the goal. Collected skeletons
//! are ordered by a refinement cost estimator and refined one at a time:
//! each step's sampler proposes option parameters, the option is validated
//! against the actual state and rolled through the simulator, and failures
//! trigger chronological backtracking. One wall-clock budget covers both
//! loops and is polled at every expansion and every sample attempt.

pub mod heuristics;
pub mod policy;

use std::collections::{BinaryHeap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::model::{
    all_ground_nsrts, Action, GroundAtom, GroundNsrt, GroundedOption, Nsrt, Object, Predicate,
    State, Task,
};
use crate::refinement::{RefinementEstimator, RefinementRecord};
use crate::{Error, Result};

use self::heuristics::{create_task_heuristic, get_reachable_atoms, TaskHeuristic};

pub use self::policy::Policy;

/// Search effort counters for one solve call.
#[derive(Debug, Clone, Default)]
pub struct PlanningMetrics {
    /// Skeletons pulled for refinement.
    pub num_skeletons_optimized: u64,
    /// Symbolic search nodes expanded.
    pub num_nodes_expanded: u64,
    /// Symbolic search nodes created.
    pub num_nodes_created: u64,
    /// Continuous samples drawn.
    pub num_samples: u64,
    /// Length of the returned plan, zero on failure.
    pub plan_length: u64,
}

/// The refined prefix of one attempted skeleton: the skeleton itself plus
/// however many grounded options were successfully instantiated before the
/// attempt stopped.
#[derive(Debug, Clone)]
pub struct PartialRefinement {
    /// The skeleton being refined.
    pub skeleton: Vec<GroundNsrt>,
    /// Options instantiated for a prefix of the skeleton.
    pub options: Vec<GroundedOption>,
}

/// Context attached to a planning timeout.
#[derive(Debug)]
pub struct TimeoutInfo {
    /// Which phase hit the deadline.
    pub phase: &'static str,
    /// Partial refinements found before the deadline, one per skeleton
    /// whose refinement began.
    pub partial_refinements: Vec<PartialRefinement>,
    /// Per-skeleton refinement outcomes, for estimator training.
    pub refinement_records: Vec<RefinementRecord>,
    /// Effort counters at the deadline.
    pub metrics: PlanningMetrics,
}

impl fmt::Display for TimeoutInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deadline hit during {} after {} skeletons and {} samples",
            self.phase, self.metrics.num_skeletons_optimized, self.metrics.num_samples
        )
    }
}

/// Context attached to a planning failure.
#[derive(Debug)]
pub struct FailureInfo {
    /// Why planning failed.
    pub reason: String,
    /// Skeletons whose refinement was attempted.
    pub skeletons_tried: usize,
    /// Partial refinements from the attempted skeletons.
    pub partial_refinements: Vec<PartialRefinement>,
    /// Per-skeleton refinement outcomes, for estimator training.
    pub refinement_records: Vec<RefinementRecord>,
    /// Effort counters at the failure.
    pub metrics: PlanningMetrics,
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} skeletons tried)", self.reason, self.skeletons_tried)
    }
}

/// A successful solve: the plan plus diagnostics.
#[derive(Debug)]
pub struct PlanningReport {
    /// Grounded options to execute in order.
    pub plan: Vec<GroundedOption>,
    /// Effort counters.
    pub metrics: PlanningMetrics,
    /// Per-skeleton refinement outcomes, for estimator training.
    pub refinement_records: Vec<RefinementRecord>,
}

/// A goal-satisfying skeleton with its expected atom trace.
struct Skeleton {
    steps: Vec<GroundNsrt>,
    /// Expected atoms before step 0, after step 0, after step 1, ...
    atoms_sequence: Vec<BTreeSet<GroundAtom>>,
    discovery_index: usize,
}

/// Outcome of refining one skeleton.
enum RefinementOutcome {
    Succeeded(Vec<GroundedOption>),
    Exhausted,
    TimedOut,
}

/// Run SeSamE planning on one task.
///
/// On success returns the plan with metrics; on failure returns
/// [`Error::Timeout`] or [`Error::Planning`], both carrying partial
/// refinements and effort counters. Search order and sampling are fully
/// determined by `seed`.
#[allow(clippy::too_many_arguments)]
pub fn sesame_plan(
    task: &Task,
    simulate: &dyn Fn(&State, &Action) -> State,
    nsrts: &[Nsrt],
    predicates: &BTreeSet<Predicate>,
    estimator: &dyn RefinementEstimator,
    config: &PlannerConfig,
    timeout: Duration,
    seed: u64,
) -> Result<PlanningReport> {
    let start = Instant::now();
    let deadline = start + timeout;
    let mut metrics = PlanningMetrics::default();
    let mut rng = StdRng::seed_from_u64(seed);

    // Predicates mentioned by the operators are always abstracted, even
    // when the caller's set omits them.
    let mut all_predicates = predicates.clone();
    for nsrt in nsrts {
        for atom in nsrt
            .op
            .preconditions
            .iter()
            .chain(&nsrt.op.add_effects)
            .chain(&nsrt.op.delete_effects)
        {
            all_predicates.insert(atom.predicate.clone());
        }
    }
    let init_atoms = crate::model::abstract_state(&task.init, &all_predicates);
    let objects: Vec<Object> = task.init.objects().cloned().collect();

    // Ground every operator over the task's objects.
    let mut sorted_nsrts = nsrts.to_vec();
    sorted_nsrts.sort();
    let mut ground: Vec<GroundNsrt> = Vec::new();
    for nsrt in &sorted_nsrts {
        if Instant::now() >= deadline {
            return Err(Error::Timeout(TimeoutInfo {
                phase: "grounding",
                partial_refinements: vec![],
                refinement_records: vec![],
                metrics,
            }));
        }
        ground.extend(all_ground_nsrts(nsrt, &objects));
    }
    // Groundings with no effects cannot advance the search.
    ground.retain(|g| !g.add_effects().is_empty() || !g.delete_effects().is_empty());

    let reachable = get_reachable_atoms(&ground, &init_atoms);
    if config.check_dr_reachable && !task.goal.is_subset(&reachable) {
        return Err(Error::Planning(FailureInfo {
            reason: "goal is not delete-relaxation reachable".to_string(),
            skeletons_tried: 0,
            partial_refinements: vec![],
            refinement_records: vec![],
            metrics,
        }));
    }
    let reachable_nsrts: Vec<GroundNsrt> = ground
        .into_iter()
        .filter(|g| g.preconditions().is_subset(&reachable))
        .collect();

    let mut heuristic = create_task_heuristic(
        &config.task_planning_heuristic,
        &init_atoms,
        &task.goal,
        &reachable_nsrts,
    )?;

    // Outer loop: collect goal-satisfying skeletons.
    let skeletons = generate_skeletons(
        task,
        &reachable_nsrts,
        &init_atoms,
        &mut heuristic,
        &mut rng,
        deadline,
        config,
        &mut metrics,
    )?;
    debug!(num_skeletons = skeletons.len(), "skeleton search finished");

    // Order skeletons by estimated refinement cost; ties break by length,
    // then discovery order.
    let mut order: Vec<(f64, usize, usize)> = skeletons
        .iter()
        .map(|sk| {
            let cost = estimator.get_cost(&task.init, &sk.steps, &sk.atoms_sequence);
            (cost, sk.steps.len(), sk.discovery_index)
        })
        .collect();
    order.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    // Inner loop: refine skeletons in order.
    let mut partial_refinements: Vec<PartialRefinement> = Vec::new();
    let mut refinement_records: Vec<RefinementRecord> = Vec::new();
    for (_, _, idx) in order {
        let skeleton = &skeletons[idx];
        metrics.num_skeletons_optimized += 1;
        partial_refinements.push(PartialRefinement {
            skeleton: skeleton.steps.clone(),
            options: Vec::new(),
        });
        let samples_before = metrics.num_samples;
        let outcome = run_low_level_search(
            task,
            simulate,
            skeleton,
            &mut rng,
            deadline,
            config,
            &mut metrics,
            partial_refinements.last_mut().expect("pushed above"),
        );
        let record = RefinementRecord {
            op_names: skeleton.steps.iter().map(|s| s.name().to_string()).collect(),
            succeeded: matches!(outcome, RefinementOutcome::Succeeded(_)),
            num_samples: metrics.num_samples - samples_before,
        };
        refinement_records.push(record);
        match outcome {
            RefinementOutcome::Succeeded(plan) => {
                metrics.plan_length = plan.len() as u64;
                info!(
                    plan_length = plan.len(),
                    skeletons = metrics.num_skeletons_optimized,
                    samples = metrics.num_samples,
                    "planning succeeded"
                );
                return Ok(PlanningReport {
                    plan,
                    metrics,
                    refinement_records,
                });
            }
            RefinementOutcome::Exhausted => {
                debug!(skeleton = metrics.num_skeletons_optimized, "skeleton exhausted");
            }
            RefinementOutcome::TimedOut => {
                return Err(Error::Timeout(TimeoutInfo {
                    phase: "refinement",
                    partial_refinements,
                    refinement_records,
                    metrics,
                }));
            }
        }
    }

    let skeletons_tried = partial_refinements.len();
    Err(Error::Planning(FailureInfo {
        reason: "every candidate skeleton failed to refine".to_string(),
        skeletons_tried,
        partial_refinements,
        refinement_records,
        metrics,
    }))
}

/// A* node in the skeleton search.
struct SearchNode {
    atoms: BTreeSet<GroundAtom>,
    skeleton: Vec<GroundNsrt>,
    atoms_sequence: Vec<BTreeSet<GroundAtom>>,
}

struct QueueEntry {
    priority: f64,
    tie: u64,
    node: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so the max-heap pops the lowest priority first.
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.tie.cmp(&self.tie))
    }
}

/// A* over skeletons: collect up to `max_skeletons_optimized`
/// goal-satisfying skeletons, checking the deadline at every expansion.
#[allow(clippy::too_many_arguments)]
fn generate_skeletons(
    task: &Task,
    ground_nsrts: &[GroundNsrt],
    init_atoms: &BTreeSet<GroundAtom>,
    heuristic: &mut TaskHeuristic,
    rng: &mut StdRng,
    deadline: Instant,
    config: &PlannerConfig,
    metrics: &mut PlanningMetrics,
) -> Result<Vec<Skeleton>> {
    let mut found: Vec<Skeleton> = Vec::new();
    let mut nodes: Vec<SearchNode> = Vec::new();
    let mut queue: BinaryHeap<QueueEntry> = BinaryHeap::new();
    nodes.push(SearchNode {
        atoms: init_atoms.clone(),
        skeleton: vec![],
        atoms_sequence: vec![init_atoms.clone()],
    });
    metrics.num_nodes_created += 1;
    queue.push(QueueEntry {
        priority: heuristic.evaluate(init_atoms),
        tie: rng.gen(),
        node: 0,
    });

    while let Some(entry) = queue.pop() {
        if Instant::now() >= deadline {
            if found.is_empty() {
                return Err(Error::Timeout(TimeoutInfo {
                    phase: "skeleton search",
                    partial_refinements: vec![],
                    refinement_records: vec![],
                    metrics: metrics.clone(),
                }));
            }
            // Refine what we have; the refinement loop will notice the
            // deadline immediately.
            return Ok(found);
        }
        if found.len() >= config.max_skeletons_optimized {
            return Ok(found);
        }
        let node_idx = entry.node;
        if task.goal.is_subset(&nodes[node_idx].atoms) {
            found.push(Skeleton {
                steps: nodes[node_idx].skeleton.clone(),
                atoms_sequence: nodes[node_idx].atoms_sequence.clone(),
                discovery_index: found.len(),
            });
            continue;
        }
        metrics.num_nodes_expanded += 1;
        for nsrt in ground_nsrts {
            if !nsrt.op.applicable(&nodes[node_idx].atoms) {
                continue;
            }
            let child_atoms = nsrt.op.apply(&nodes[node_idx].atoms);
            let mut skeleton = nodes[node_idx].skeleton.clone();
            skeleton.push(nsrt.clone());
            let mut atoms_sequence = nodes[node_idx].atoms_sequence.clone();
            atoms_sequence.push(child_atoms.clone());
            let priority = skeleton.len() as f64 + heuristic.evaluate(&child_atoms);
            if priority.is_infinite() {
                continue;
            }
            nodes.push(SearchNode {
                atoms: child_atoms,
                skeleton,
                atoms_sequence,
            });
            metrics.num_nodes_created += 1;
            queue.push(QueueEntry {
                priority,
                tie: rng.gen(),
                node: nodes.len() - 1,
            });
        }
    }
    if found.is_empty() {
        return Err(Error::Planning(FailureInfo {
            reason: "skeleton search exhausted without reaching the goal".to_string(),
            skeletons_tried: 0,
            partial_refinements: vec![],
            refinement_records: vec![],
            metrics: metrics.clone(),
        }));
    }
    Ok(found)
}

/// Backtracking search over continuous parameters for one skeleton.
///
/// Each step draws up to `max_samples_per_step` samples; a step that
/// exhausts its budget resets and sends the search back one step
/// (chronological backtracking). The deadline is polled before every
/// sample. `partial` tracks the longest refined prefix for fallback use.
#[allow(clippy::too_many_arguments)]
fn run_low_level_search(
    task: &Task,
    simulate: &dyn Fn(&State, &Action) -> State,
    skeleton: &Skeleton,
    rng: &mut StdRng,
    deadline: Instant,
    config: &PlannerConfig,
    metrics: &mut PlanningMetrics,
    partial: &mut PartialRefinement,
) -> RefinementOutcome {
    let n = skeleton.steps.len();
    if n == 0 {
        // The initial atoms already satisfy the goal.
        return RefinementOutcome::Succeeded(vec![]);
    }
    let mut num_tries = vec![0usize; n];
    let mut plan: Vec<Option<GroundedOption>> = vec![None; n];
    // Placeholder clones beyond index 0; entries are overwritten before
    // they are ever read.
    let mut traj: Vec<State> = vec![task.init.clone(); n + 1];

    let mut cur_idx = 0;
    loop {
        if Instant::now() >= deadline {
            return RefinementOutcome::TimedOut;
        }
        if num_tries[cur_idx] >= config.max_samples_per_step {
            // This step is out of budget: reset it and back up.
            num_tries[cur_idx] = 0;
            plan[cur_idx] = None;
            if cur_idx == 0 {
                return RefinementOutcome::Exhausted;
            }
            cur_idx -= 1;
            continue;
        }
        num_tries[cur_idx] += 1;
        metrics.num_samples += 1;
        let step = &skeleton.steps[cur_idx];
        let option = step.sample_option(&traj[cur_idx], rng);
        if !option.initiable(&traj[cur_idx]) {
            continue;
        }
        let Some(next_state) = rollout_option(
            &option,
            &traj[cur_idx],
            simulate,
            config.max_option_rollout_steps,
        ) else {
            continue;
        };
        // The expected atoms are ones we definitely expect to be true at
        // this point in the plan, not all atoms that could be true. Atoms
        // of predicates the step may scramble are re-derived, not assumed.
        let side = step.side_predicates();
        let expected_ok = skeleton.atoms_sequence[cur_idx + 1]
            .iter()
            .filter(|atom| !side.contains(&atom.predicate))
            .all(|atom| atom.holds(&next_state));
        if !expected_ok {
            continue;
        }
        plan[cur_idx] = Some(option);
        traj[cur_idx + 1] = next_state;
        cur_idx += 1;
        if cur_idx > partial.options.len() {
            partial.options = plan[..cur_idx]
                .iter()
                .map(|o| o.clone().expect("prefix is refined"))
                .collect();
        }
        if cur_idx == n {
            let refined: Vec<GroundedOption> = plan
                .into_iter()
                .map(|o| o.expect("all steps refined"))
                .collect();
            return RefinementOutcome::Succeeded(refined);
        }
    }
}

/// Run an option's policy through the simulator until its termination
/// condition holds. `None` when the step budget runs out first.
fn rollout_option(
    option: &GroundedOption,
    state: &State,
    simulate: &dyn Fn(&State, &Action) -> State,
    max_steps: usize,
) -> Option<State> {
    let mut state = state.clone();
    for step in 0..max_steps {
        let action = option.policy(&state, step);
        state = simulate(&state, &action);
        if option.terminal(&state) {
            return Some(state);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoxSpace, ParameterizedOption, Type};

    #[test]
    fn test_rollout_stops_at_termination() {
        let ty = Type::new("dot", &["x"]);
        let dot = Object::new("dot0", ty.clone());
        let opt = ParameterizedOption::new(
            "March",
            vec![ty],
            BoxSpace::new(vec![0.0], vec![1.0]),
            |_, _, _| Action::new(vec![1.0]),
            |_, _, _| true,
            |s, o, _| s.get(&o[0], "x") >= 3.0,
        );
        let grounded = opt.ground(vec![dot.clone()], vec![0.5]);
        let state = State::new([(dot.clone(), vec![0.0])]);
        let simulate = move |s: &State, a: &Action| {
            let mut next = s.clone();
            let x = next.get(&dot, "x");
            next.set(&dot, "x", x + a.arr[0]);
            next
        };
        let end = rollout_option(&grounded, &state, &simulate, 10).expect("terminates");
        let dot1 = Object::new("dot0", Type::new("dot", &["x"]));
        assert_eq!(end.get(&dot1, "x"), 3.0);
        // A two-step budget is not enough to reach 3.0.
        assert!(rollout_option(&grounded, &state, &simulate, 2).is_none());
    }

    #[test]
    fn test_queue_entry_orders_by_priority() {
        let mut heap = BinaryHeap::new();
        heap.push(QueueEntry { priority: 2.0, tie: 0, node: 0 });
        heap.push(QueueEntry { priority: 1.0, tie: 1, node: 1 });
        heap.push(QueueEntry { priority: 1.0, tie: 0, node: 2 });
        assert_eq!(heap.pop().map(|e| e.node), Some(2));
        assert_eq!(heap.pop().map(|e| e.node), Some(1));
        assert_eq!(heap.pop().map(|e| e.node), Some(0));
    }

    #[test]
    fn test_metrics_default_is_zeroed() {
        let metrics = PlanningMetrics::default();
        assert_eq!(metrics.num_samples, 0);
        assert_eq!(metrics.plan_length, 0);
    }
}
