//! Unification of concrete transition effects against lifted operator
//! schemas.
//!
//! The clustering learner asks one question over and over: does a segment's
//! observed (add effects, delete effects, option binding) match an
//! operator's lifted pattern under some variable-to-object substitution?
//! The substitution must be a bijection so distinct variables never alias
//! one object.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{GroundAtom, LiftedAtom, Object, ParameterizedOption, Variable};

/// A variable-to-object substitution.
pub type VarToObj = BTreeMap<Variable, Object>;

/// Try to unify a segment's effects and option binding with an operator's
/// lifted effects and option binding.
///
/// Returns the substitution mapping the operator's variables onto the
/// segment's objects, or `None` when no bijective, type-consistent mapping
/// exists. Both effect sets must be matched exactly: every lifted atom
/// consumes a distinct ground atom and no ground atom is left over.
pub fn unify_effects_and_option(
    seg_add: &BTreeSet<GroundAtom>,
    op_add: &BTreeSet<LiftedAtom>,
    seg_del: &BTreeSet<GroundAtom>,
    op_del: &BTreeSet<LiftedAtom>,
    seg_option: (&ParameterizedOption, &[Object]),
    op_option: (&ParameterizedOption, &[Variable]),
) -> Option<VarToObj> {
    let (seg_parent, seg_objs) = seg_option;
    let (op_parent, op_vars) = op_option;
    if seg_parent != op_parent || seg_objs.len() != op_vars.len() {
        return None;
    }
    if seg_add.len() != op_add.len() || seg_del.len() != op_del.len() {
        return None;
    }
    let mut var_to_obj = VarToObj::new();
    let mut obj_to_var: BTreeMap<Object, Variable> = BTreeMap::new();
    // The option binding fixes its variables up front.
    for (var, obj) in op_vars.iter().zip(seg_objs) {
        if !bind(var, obj, &mut var_to_obj, &mut obj_to_var) {
            return None;
        }
    }
    // Match add effects then delete effects, backtracking over candidate
    // ground atoms for each lifted atom.
    let lifted: Vec<&LiftedAtom> = op_add.iter().chain(op_del).collect();
    let ground: Vec<&GroundAtom> = seg_add.iter().chain(seg_del).collect();
    let add_count = op_add.len();
    let mut used = vec![false; ground.len()];
    if match_atoms(
        &lifted,
        &ground,
        add_count,
        0,
        &mut used,
        &mut var_to_obj,
        &mut obj_to_var,
    ) {
        Some(var_to_obj)
    } else {
        None
    }
}

/// Bind a variable to an object, enforcing types and bijectivity.
fn bind(
    var: &Variable,
    obj: &Object,
    var_to_obj: &mut VarToObj,
    obj_to_var: &mut BTreeMap<Object, Variable>,
) -> bool {
    if &var.ty != obj.ty() {
        return false;
    }
    if let Some(bound) = var_to_obj.get(var) {
        return bound == obj;
    }
    if obj_to_var.contains_key(obj) {
        return false;
    }
    var_to_obj.insert(var.clone(), obj.clone());
    obj_to_var.insert(obj.clone(), var.clone());
    true
}

/// Recursively assign each lifted atom to an unused ground atom.
///
/// Lifted atoms before `add_count` may only match ground atoms before
/// `add_count` (add effects match add effects, deletes match deletes).
fn match_atoms(
    lifted: &[&LiftedAtom],
    ground: &[&GroundAtom],
    add_count: usize,
    idx: usize,
    used: &mut [bool],
    var_to_obj: &mut VarToObj,
    obj_to_var: &mut BTreeMap<Object, Variable>,
) -> bool {
    if idx == lifted.len() {
        return true;
    }
    let atom = lifted[idx];
    let (lo, hi) = if idx < add_count {
        (0, add_count)
    } else {
        (add_count, ground.len())
    };
    for g_idx in lo..hi {
        if used[g_idx] || ground[g_idx].predicate != atom.predicate {
            continue;
        }
        // Tentatively bind, remembering what was new so we can undo.
        let mut added: Vec<Variable> = Vec::new();
        let mut ok = true;
        for (var, obj) in atom.variables.iter().zip(&ground[g_idx].objects) {
            let fresh = !var_to_obj.contains_key(var);
            if bind(var, obj, var_to_obj, obj_to_var) {
                if fresh {
                    added.push(var.clone());
                }
            } else {
                ok = false;
                break;
            }
        }
        if ok {
            used[g_idx] = true;
            if match_atoms(lifted, ground, add_count, idx + 1, used, var_to_obj, obj_to_var) {
                return true;
            }
            used[g_idx] = false;
        }
        for var in added {
            if let Some(obj) = var_to_obj.remove(&var) {
                obj_to_var.remove(&obj);
            }
        }
    }
    false
}
