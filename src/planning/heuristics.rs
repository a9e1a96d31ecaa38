//! Task-planning heuristics over delete relaxations.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::model::{GroundAtom, GroundNsrt};
use crate::{Error, Result};

/// Fixpoint of atoms reachable from `init` when delete effects are
/// ignored. Used both to prune unreachable groundings and to reject
/// unreachable goals early.
pub fn get_reachable_atoms(
    ground_nsrts: &[GroundNsrt],
    init: &BTreeSet<GroundAtom>,
) -> BTreeSet<GroundAtom> {
    let mut reachable = init.clone();
    loop {
        let mut fixed_point = true;
        for nsrt in ground_nsrts {
            if !nsrt.preconditions().is_subset(&reachable) {
                continue;
            }
            for atom in nsrt.add_effects() {
                if reachable.insert(atom.clone()) {
                    fixed_point = false;
                }
            }
        }
        if fixed_point {
            return reachable;
        }
    }
}

/// A heuristic over symbolic states, selected by name.
pub enum TaskHeuristic {
    /// Additive heuristic over the delete relaxation.
    HAdd(HAddHeuristic),
    /// Number of unsatisfied goal atoms.
    GoalCount { goal: BTreeSet<GroundAtom> },
}

impl TaskHeuristic {
    /// Estimate cost-to-goal from an atom set. Infinity means the goal is
    /// unreachable under the relaxation.
    pub fn evaluate(&mut self, atoms: &BTreeSet<GroundAtom>) -> f64 {
        match self {
            Self::HAdd(h) => h.evaluate(atoms),
            Self::GoalCount { goal } => goal.difference(atoms).count() as f64,
        }
    }
}

/// Create a task-planning heuristic by name.
pub fn create_task_heuristic(
    name: &str,
    init: &BTreeSet<GroundAtom>,
    goal: &BTreeSet<GroundAtom>,
    ground_nsrts: &[GroundNsrt],
) -> Result<TaskHeuristic> {
    match name {
        "hadd" => Ok(TaskHeuristic::HAdd(HAddHeuristic::new(
            init,
            goal,
            ground_nsrts,
        ))),
        "goal_count" => Ok(TaskHeuristic::GoalCount { goal: goal.clone() }),
        other => Err(Error::NotImplemented(format!(
            "unknown task planning heuristic: {other}"
        ))),
    }
}

/// The additive heuristic: each goal atom's relaxed cost is computed by a
/// Dijkstra forward pass over facts, and the estimate is their sum.
pub struct HAddHeuristic {
    fact_ids: BTreeMap<GroundAtom, usize>,
    facts: Vec<FactNode>,
    ops: Vec<RelaxedOp>,
    goal_ids: Vec<usize>,
    tie_breaker: usize,
}

struct FactNode {
    distance: f64,
    expanded: bool,
    /// Operators this fact is a precondition of.
    precondition_of: Vec<usize>,
}

struct RelaxedOp {
    preconditions: Vec<usize>,
    add_effects: Vec<usize>,
    cost: f64,
    /// Unsatisfied-precondition countdown, reset per evaluation.
    counter: usize,
}

struct HeapEntry {
    distance: f64,
    tie: usize,
    fact: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the smallest distance first.
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.tie.cmp(&self.tie))
    }
}

impl HAddHeuristic {
    /// Build the relaxed fact/operator graph once; evaluations reuse it.
    pub fn new(
        init: &BTreeSet<GroundAtom>,
        goal: &BTreeSet<GroundAtom>,
        ground_nsrts: &[GroundNsrt],
    ) -> Self {
        let mut fact_ids: BTreeMap<GroundAtom, usize> = BTreeMap::new();
        let intern = |atom: &GroundAtom, fact_ids: &mut BTreeMap<GroundAtom, usize>| {
            if let Some(id) = fact_ids.get(atom) {
                return *id;
            }
            let id = fact_ids.len();
            fact_ids.insert(atom.clone(), id);
            id
        };
        for atom in init.iter().chain(goal) {
            intern(atom, &mut fact_ids);
        }
        let mut ops = Vec::with_capacity(ground_nsrts.len());
        for nsrt in ground_nsrts {
            let preconditions: Vec<usize> = nsrt
                .preconditions()
                .iter()
                .map(|a| intern(a, &mut fact_ids))
                .collect();
            let add_effects: Vec<usize> = nsrt
                .add_effects()
                .iter()
                .map(|a| intern(a, &mut fact_ids))
                .collect();
            ops.push(RelaxedOp {
                preconditions,
                add_effects,
                cost: 1.0,
                counter: 0,
            });
        }
        let mut facts: Vec<FactNode> = (0..fact_ids.len())
            .map(|_| FactNode {
                distance: f64::INFINITY,
                expanded: false,
                precondition_of: Vec::new(),
            })
            .collect();
        for (op_idx, op) in ops.iter().enumerate() {
            for &fact in &op.preconditions {
                facts[fact].precondition_of.push(op_idx);
            }
        }
        let goal_ids = goal.iter().map(|a| fact_ids[a]).collect();
        Self {
            fact_ids,
            facts,
            ops,
            goal_ids,
            tie_breaker: 0,
        }
    }

    /// Compute the additive estimate from the given atom set.
    pub fn evaluate(&mut self, atoms: &BTreeSet<GroundAtom>) -> f64 {
        // Reset per-evaluation scratch state.
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
        for fact in &mut self.facts {
            fact.distance = f64::INFINITY;
            fact.expanded = false;
        }
        for op in &mut self.ops {
            op.counter = op.preconditions.len();
        }
        for atom in atoms {
            if let Some(&id) = self.fact_ids.get(atom) {
                self.facts[id].distance = 0.0;
                heap.push(HeapEntry {
                    distance: 0.0,
                    tie: self.tie_breaker,
                    fact: id,
                });
                self.tie_breaker += 1;
            }
        }
        // Operators with no preconditions fire unconditionally.
        for op_idx in 0..self.ops.len() {
            if self.ops[op_idx].preconditions.is_empty() {
                self.apply_op(op_idx, &mut heap);
            }
        }
        self.dijkstra(&mut heap);
        self.goal_ids
            .iter()
            .map(|&id| self.facts[id].distance)
            .sum()
    }

    /// Relax one operator's add effects given its current precondition
    /// costs.
    fn apply_op(&mut self, op_idx: usize, heap: &mut BinaryHeap<HeapEntry>) {
        let cost: f64 = self.ops[op_idx]
            .preconditions
            .iter()
            .map(|&f| self.facts[f].distance)
            .sum::<f64>()
            + self.ops[op_idx].cost;
        for i in 0..self.ops[op_idx].add_effects.len() {
            let fact = self.ops[op_idx].add_effects[i];
            if cost < self.facts[fact].distance {
                self.facts[fact].distance = cost;
                heap.push(HeapEntry {
                    distance: cost,
                    tie: self.tie_breaker,
                    fact,
                });
                self.tie_breaker += 1;
            }
        }
    }

    fn dijkstra(&mut self, heap: &mut BinaryHeap<HeapEntry>) {
        let mut achieved_goals = 0;
        let goal_set: BTreeSet<usize> = self.goal_ids.iter().copied().collect();
        while let Some(entry) = heap.pop() {
            let fact = entry.fact;
            if self.facts[fact].expanded {
                continue;
            }
            self.facts[fact].expanded = true;
            if goal_set.contains(&fact) {
                achieved_goals += 1;
                if achieved_goals == goal_set.len() {
                    return;
                }
            }
            let dependents = self.facts[fact].precondition_of.clone();
            for op_idx in dependents {
                self.ops[op_idx].counter = self.ops[op_idx].counter.saturating_sub(1);
                if self.ops[op_idx].counter == 0 {
                    self.apply_op(op_idx, heap);
                }
            }
        }
    }
}
