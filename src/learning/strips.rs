//! STRIPS operator induction over segmented trajectories.
//!
//! Segments cluster by unifiable (effects, option) signatures into
//! candidate operators; preconditions come from intersecting lifted
//! initial atoms over each candidate's supporting segments. An optional
//! hill-climbing pass trades add effects for side predicates, scored by
//! prediction error over the whole segment set.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use itertools::Itertools;
use tracing::{debug, info};

use crate::config::LearnerConfig;
use crate::learning::unify::{unify_effects_and_option, VarToObj};
use crate::model::{
    create_new_variables, get_object_combinations, LiftedAtom, Object, ParameterizedOption,
    Segment, StripsOperator, Variable,
};
use crate::{Error, Result};

/// One segment supporting a candidate operator, with the substitution that
/// maps the operator's parameters onto the segment's objects.
#[derive(Debug, Clone)]
pub struct DatastoreEntry {
    /// Index into the learner's flattened segment list.
    pub segment: usize,
    /// Operator parameters to segment objects.
    pub var_to_obj: VarToObj,
}

/// A candidate operator plus the segments currently supporting it: the
/// working unit of operator-induction search.
#[derive(Debug, Clone)]
pub struct Pnad {
    /// Candidate symbolic operator.
    pub op: StripsOperator,
    /// The option this operator executes through.
    pub option: ParameterizedOption,
    /// Operator parameters passed to the option, in option argument order.
    pub option_vars: Vec<Variable>,
    /// Supporting segments. Recomputed from scratch whenever the operator
    /// set changes.
    pub datastore: Vec<DatastoreEntry>,
}

impl fmt::Display for Pnad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n  option: {}({})\n  datastore size: {}",
            self.op,
            self.option,
            self.option_vars.iter().map(|v| v.name.as_str()).join(", "),
            self.datastore.len()
        )
    }
}

/// Learns STRIPS operators from a flattened list of segments.
pub struct StripsLearner<'a> {
    segments: &'a [Segment],
    config: &'a LearnerConfig,
}

impl<'a> StripsLearner<'a> {
    /// Create a learner over the given segments.
    pub fn new(segments: &'a [Segment], config: &'a LearnerConfig) -> Self {
        Self { segments, config }
    }

    /// Run the configured induction strategy.
    pub fn learn(&self) -> Result<Vec<Pnad>> {
        match self.config.strategy.as_str() {
            "cluster_and_intersect" => {
                let mut pnads = self.cluster();
                self.intersect_preconditions(&mut pnads);
                Ok(pnads)
            }
            "cluster_and_intersect_sideline_prederror" => {
                let mut pnads = self.cluster();
                self.intersect_preconditions(&mut pnads);
                let mut pnads = self.sideline_hill_climb(pnads);
                self.recompute_datastores_from_segments(&mut pnads);
                Ok(pnads)
            }
            other => Err(Error::NotImplemented(format!(
                "unknown STRIPS learning strategy: {other}"
            ))),
        }
    }

    /// The acting option of a segment, with the no-option placeholder for
    /// untagged segments.
    fn segment_option(segment: &Segment) -> (ParameterizedOption, Vec<Object>) {
        match segment.option() {
            Some(opt) => (opt.parent().clone(), opt.objects().to_vec()),
            None => (ParameterizedOption::no_option(), vec![]),
        }
    }

    /// Cluster segments by unifiable (effects, option) signatures. Each
    /// segment joins the first matching candidate, or founds a new one.
    fn cluster(&self) -> Vec<Pnad> {
        let mut pnads: Vec<Pnad> = Vec::new();
        for (seg_idx, segment) in self.segments.iter().enumerate() {
            let (seg_parent, seg_objs) = Self::segment_option(segment);
            let seg_add = segment.add_effects();
            let seg_del = segment.delete_effects();
            let mut assigned = false;
            for pnad in &mut pnads {
                if let Some(sub) = unify_effects_and_option(
                    &seg_add,
                    &pnad.op.add_effects,
                    &seg_del,
                    &pnad.op.delete_effects,
                    (&seg_parent, &seg_objs),
                    (&pnad.option, &pnad.option_vars),
                ) {
                    debug_assert_eq!(
                        sub.keys().cloned().collect::<BTreeSet<_>>(),
                        pnad.op.parameters.iter().cloned().collect::<BTreeSet<_>>()
                    );
                    pnad.datastore.push(DatastoreEntry {
                        segment: seg_idx,
                        var_to_obj: sub,
                    });
                    assigned = true;
                    break;
                }
            }
            if assigned {
                continue;
            }
            pnads.push(Self::found_pnad(
                &format!("Op{}", pnads.len()),
                segment,
                seg_idx,
                seg_parent,
                &seg_objs,
            ));
        }
        pnads
    }

    /// Found a new candidate from a single segment: parameters cover every
    /// object in the effects and the option binding; preconditions start
    /// empty and are induced later.
    fn found_pnad(
        name: &str,
        segment: &Segment,
        seg_idx: usize,
        seg_parent: ParameterizedOption,
        seg_objs: &[Object],
    ) -> Pnad {
        let seg_add = segment.add_effects();
        let seg_del = segment.delete_effects();
        let mut objects: BTreeSet<Object> = seg_objs.iter().cloned().collect();
        for atom in seg_add.iter().chain(&seg_del) {
            objects.extend(atom.objects.iter().cloned());
        }
        let objects: Vec<Object> = objects.into_iter().collect();
        let types: Vec<_> = objects.iter().map(|o| o.ty().clone()).collect();
        let params = create_new_variables(&types);
        let obj_to_var: BTreeMap<Object, Variable> =
            objects.iter().cloned().zip(params.iter().cloned()).collect();
        let var_to_obj: VarToObj =
            params.iter().cloned().zip(objects.iter().cloned()).collect();
        let add_effects: BTreeSet<LiftedAtom> =
            seg_add.iter().map(|a| a.lift(&obj_to_var)).collect();
        let delete_effects: BTreeSet<LiftedAtom> =
            seg_del.iter().map(|a| a.lift(&obj_to_var)).collect();
        let op = StripsOperator::new(
            name,
            params,
            BTreeSet::new(),
            add_effects,
            delete_effects,
            BTreeSet::new(),
        );
        let option_vars = seg_objs.iter().map(|o| obj_to_var[o].clone()).collect();
        Pnad {
            op,
            option: seg_parent,
            option_vars,
            datastore: vec![DatastoreEntry {
                segment: seg_idx,
                var_to_obj,
            }],
        }
    }

    /// Induce each candidate's preconditions by intersecting the lifted
    /// initial atoms over its datastore. Intersection can only shrink the
    /// precondition set, so datastores stay valid.
    fn intersect_preconditions(&self, pnads: &mut Vec<Pnad>) {
        for pnad in pnads.iter_mut() {
            let mut intersection: Option<BTreeSet<LiftedAtom>> = None;
            for entry in &pnad.datastore {
                let segment = &self.segments[entry.segment];
                let obj_to_var: BTreeMap<Object, Variable> = entry
                    .var_to_obj
                    .iter()
                    .map(|(v, o)| (o.clone(), v.clone()))
                    .collect();
                let lifted: BTreeSet<LiftedAtom> = segment
                    .init_atoms
                    .iter()
                    .filter(|atom| atom.objects.iter().all(|o| obj_to_var.contains_key(o)))
                    .map(|atom| atom.lift(&obj_to_var))
                    .collect();
                intersection = Some(match intersection {
                    None => lifted,
                    Some(acc) => acc.intersection(&lifted).cloned().collect(),
                });
            }
            let preconditions = intersection.unwrap_or_default();
            pnad.op = pnad.op.with_preconditions(preconditions);
        }
    }

    /// Reset every datastore, then assign each segment (in stable order) to
    /// the FIRST candidate admitting a grounding whose preconditions hold
    /// in the segment's initial atoms and whose effects equal the observed
    /// diff with a matching option binding. Segments matching no candidate
    /// are left unassigned. First-match assignment is load-bearing:
    /// downstream scoring assumes it, so it is never "improved" to
    /// best-match.
    pub fn recompute_datastores_from_segments(&self, pnads: &mut [Pnad]) {
        for pnad in pnads.iter_mut() {
            pnad.datastore.clear();
        }
        for (seg_idx, segment) in self.segments.iter().enumerate() {
            for pnad in pnads.iter_mut() {
                if let Some(sub) = self.segment_matches(pnad, segment) {
                    pnad.datastore.push(DatastoreEntry {
                        segment: seg_idx,
                        var_to_obj: sub,
                    });
                    break;
                }
            }
        }
    }

    /// Find a grounding of the candidate consistent with a segment:
    /// preconditions hold in the segment's initial atoms and the effects
    /// match the observed diff exactly, modulo the candidate's side
    /// predicates. Groundings are enumerated in deterministic order and
    /// the first hit wins.
    fn segment_matches(&self, pnad: &Pnad, segment: &Segment) -> Option<VarToObj> {
        let (seg_parent, seg_objs) = Self::segment_option(segment);
        if seg_parent != pnad.option || seg_objs.len() != pnad.option_vars.len() {
            return None;
        }
        let side = &pnad.op.side_predicates;
        let seg_add = segment
            .add_effects()
            .into_iter()
            .filter(|a| !side.contains(&a.predicate))
            .collect::<BTreeSet<_>>();
        let seg_del = segment
            .delete_effects()
            .into_iter()
            .filter(|a| !side.contains(&a.predicate))
            .collect::<BTreeSet<_>>();
        let objects = segment.objects();
        let types: Vec<_> = pnad.op.parameters.iter().map(|v| v.ty.clone()).collect();
        for combo in get_object_combinations(&objects, &types, false) {
            let sub: VarToObj = pnad
                .op
                .parameters
                .iter()
                .cloned()
                .zip(combo.iter().cloned())
                .collect();
            let bound_option_objs: Vec<Object> = pnad
                .option_vars
                .iter()
                .map(|v| sub[v].clone())
                .collect();
            if bound_option_objs != seg_objs {
                continue;
            }
            let ground = pnad.op.ground(&combo);
            if !ground.preconditions.is_subset(&segment.init_atoms) {
                continue;
            }
            if ground.add_effects == seg_add && ground.delete_effects == seg_del {
                return Some(sub);
            }
        }
        None
    }

    /// Hill-climb over candidate sets: successors sideline one add effect
    /// or drop one candidate; the score is weighted false positives minus
    /// weighted true positives over all segments. Stops at the first local
    /// minimum.
    fn sideline_hill_climb(&self, pnads: Vec<Pnad>) -> Vec<Pnad> {
        let mut current = pnads;
        let mut current_score = self.prediction_error_score(&current);
        loop {
            let mut best: Option<(f64, Vec<Pnad>)> = None;
            for successor in self.sidelining_successors(&current) {
                let score = self.prediction_error_score(&successor);
                if best.as_ref().map_or(true, |(s, _)| score < *s) {
                    best = Some((score, successor));
                }
            }
            match best {
                Some((score, successor)) if score < current_score => {
                    debug!(score, "sidelining step improved prediction error");
                    current = successor;
                    current_score = score;
                }
                _ => break,
            }
        }
        current
    }

    /// All one-step modifications of a candidate set, in deterministic
    /// order.
    fn sidelining_successors(&self, pnads: &[Pnad]) -> Vec<Vec<Pnad>> {
        let mut successors = Vec::new();
        for (i, pnad) in pnads.iter().enumerate() {
            // Sidelining must not leave the operator a no-op.
            if pnad.op.add_effects.len() > 1 {
                for effect in &pnad.op.add_effects {
                    let mut next = pnads.to_vec();
                    next[i].op = pnad.op.sideline_add_effect(effect, &pnad.option_vars);
                    successors.push(next);
                }
            }
            let mut without = pnads.to_vec();
            without.remove(i);
            successors.push(without);
        }
        successors
    }

    /// Weighted prediction error of a candidate set over every segment.
    /// Lower is better.
    fn prediction_error_score(&self, pnads: &[Pnad]) -> f64 {
        let (tp, fp) = self.count_positives(pnads);
        self.config.false_pos_weight * fp as f64 - self.config.true_pos_weight * tp as f64
    }

    /// Count, over all (segment, candidate) pairs, segments an operator
    /// explains (true positives) and segments where some grounding's
    /// preconditions hold but the effects disagree (false positives).
    fn count_positives(&self, pnads: &[Pnad]) -> (usize, usize) {
        let mut true_positives = 0;
        let mut false_positives = 0;
        for segment in self.segments {
            for pnad in pnads {
                if self.segment_matches_for_scoring(pnad, segment) {
                    true_positives += 1;
                } else if self.preconditions_hold_somewhere(pnad, segment) {
                    false_positives += 1;
                }
            }
        }
        (true_positives, false_positives)
    }

    fn segment_matches_for_scoring(&self, pnad: &Pnad, segment: &Segment) -> bool {
        self.segment_matches(pnad, segment).is_some()
    }

    /// Whether any grounding of the candidate has its preconditions
    /// satisfied in the segment's initial atoms (option binding included).
    fn preconditions_hold_somewhere(&self, pnad: &Pnad, segment: &Segment) -> bool {
        let (seg_parent, seg_objs) = Self::segment_option(segment);
        if seg_parent != pnad.option || seg_objs.len() != pnad.option_vars.len() {
            return false;
        }
        let objects = segment.objects();
        let types: Vec<_> = pnad.op.parameters.iter().map(|v| v.ty.clone()).collect();
        for combo in get_object_combinations(&objects, &types, false) {
            let sub: VarToObj = pnad
                .op
                .parameters
                .iter()
                .cloned()
                .zip(combo.iter().cloned())
                .collect();
            let bound_option_objs: Vec<Object> = pnad
                .option_vars
                .iter()
                .map(|v| sub[v].clone())
                .collect();
            if bound_option_objs != seg_objs {
                continue;
            }
            if pnad.op.ground(&combo).preconditions.is_subset(&segment.init_atoms) {
                return true;
            }
        }
        false
    }
}

/// Convenience wrapper: learn PNADs and log the outcome.
pub fn learn_strips_operators(
    segments: &[Segment],
    config: &LearnerConfig,
) -> Result<Vec<Pnad>> {
    let learner = StripsLearner::new(segments, config);
    let pnads = learner.learn()?;
    info!(
        num_segments = segments.len(),
        num_operators = pnads.len(),
        "learned STRIPS operators"
    );
    for pnad in &pnads {
        debug!(%pnad, "learned operator");
    }
    Ok(pnads)
}
