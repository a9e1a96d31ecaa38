//! STRIPS operators and their bindings to continuous skills (NSRTs).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;

use itertools::Itertools;

use crate::model::option::{GroundedOption, ParameterizedOption};
use crate::model::predicate::{get_object_combinations, GroundAtom, LiftedAtom, Predicate, Variable};
use crate::model::state::{Object, State};

/// A symbolic action schema over typed parameter variables.
///
/// Preconditions and effects may only reference the operator's own
/// parameters. Side predicates mark relations whose truth the operator may
/// scramble unpredictably; their atoms are re-derived from the state rather
/// than assumed during planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripsOperator {
    /// Operator name.
    pub name: String,
    /// Typed parameter variables.
    pub parameters: Vec<Variable>,
    /// Atoms that must hold before application.
    pub preconditions: BTreeSet<LiftedAtom>,
    /// Atoms made true by application.
    pub add_effects: BTreeSet<LiftedAtom>,
    /// Atoms made false by application.
    pub delete_effects: BTreeSet<LiftedAtom>,
    /// Predicates whose truth may change unpredictably.
    pub side_predicates: BTreeSet<Predicate>,
}

impl StripsOperator {
    /// Create an operator, checking that every atom references only the
    /// declared parameters.
    pub fn new(
        name: &str,
        parameters: Vec<Variable>,
        preconditions: BTreeSet<LiftedAtom>,
        add_effects: BTreeSet<LiftedAtom>,
        delete_effects: BTreeSet<LiftedAtom>,
        side_predicates: BTreeSet<Predicate>,
    ) -> Self {
        let declared: BTreeSet<&Variable> = parameters.iter().collect();
        for atom in preconditions
            .iter()
            .chain(&add_effects)
            .chain(&delete_effects)
        {
            assert!(
                atom.variables.iter().all(|v| declared.contains(v)),
                "operator {name} references undeclared variable in {atom}"
            );
        }
        Self {
            name: name.to_string(),
            parameters,
            preconditions,
            add_effects,
            delete_effects,
            side_predicates,
        }
    }

    /// Copy with replaced preconditions.
    pub fn with_preconditions(&self, preconditions: BTreeSet<LiftedAtom>) -> Self {
        Self::new(
            &self.name,
            self.parameters.clone(),
            preconditions,
            self.add_effects.clone(),
            self.delete_effects.clone(),
            self.side_predicates.clone(),
        )
    }

    /// Copy with a new name.
    pub fn with_name(&self, name: &str) -> Self {
        let mut op = self.clone();
        op.name = name.to_string();
        op
    }

    /// Move one add effect into the side-predicate set.
    ///
    /// Parameters no longer referenced by any remaining atom are pruned,
    /// except those listed in `keep` (typically the option's argument
    /// variables, which must survive for grounding).
    pub fn sideline_add_effect(&self, effect: &LiftedAtom, keep: &[Variable]) -> Self {
        assert!(
            self.add_effects.contains(effect),
            "operator {} has no add effect {effect}",
            self.name
        );
        let mut add_effects = self.add_effects.clone();
        add_effects.remove(effect);
        let mut side_predicates = self.side_predicates.clone();
        side_predicates.insert(effect.predicate.clone());
        let mut referenced: BTreeSet<Variable> = keep.iter().cloned().collect();
        for atom in self
            .preconditions
            .iter()
            .chain(&add_effects)
            .chain(&self.delete_effects)
        {
            referenced.extend(atom.variables.iter().cloned());
        }
        let parameters = self
            .parameters
            .iter()
            .filter(|v| referenced.contains(v))
            .cloned()
            .collect();
        Self::new(
            &self.name,
            parameters,
            self.preconditions.clone(),
            add_effects,
            self.delete_effects.clone(),
            side_predicates,
        )
    }

    /// Bind the operator to concrete objects.
    pub fn ground(&self, objects: &[Object]) -> GroundOperator {
        assert_eq!(
            objects.len(),
            self.parameters.len(),
            "arity mismatch grounding {}",
            self.name
        );
        assert!(
            objects
                .iter()
                .zip(&self.parameters)
                .all(|(o, v)| o.ty() == &v.ty),
            "object type mismatch grounding {}",
            self.name
        );
        let sub: BTreeMap<Variable, Object> = self
            .parameters
            .iter()
            .cloned()
            .zip(objects.iter().cloned())
            .collect();
        GroundOperator {
            name: self.name.clone(),
            objects: objects.to_vec(),
            preconditions: self.preconditions.iter().map(|a| a.ground(&sub)).collect(),
            add_effects: self.add_effects.iter().map(|a| a.ground(&sub)).collect(),
            delete_effects: self.delete_effects.iter().map(|a| a.ground(&sub)).collect(),
        }
    }
}

impl fmt::Display for StripsOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}({})",
            self.name,
            self.parameters.iter().map(|v| v.to_string()).join(", ")
        )?;
        writeln!(f, "  pre: [{}]", self.preconditions.iter().join(", "))?;
        writeln!(f, "  add: [{}]", self.add_effects.iter().join(", "))?;
        writeln!(f, "  del: [{}]", self.delete_effects.iter().join(", "))?;
        write!(f, "  side: [{}]", self.side_predicates.iter().join(", "))
    }
}

/// A STRIPS operator bound to concrete objects, usable in symbolic forward
/// search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundOperator {
    /// Schema name.
    pub name: String,
    /// Bound objects, positionally matching the schema parameters.
    pub objects: Vec<Object>,
    /// Grounded preconditions.
    pub preconditions: BTreeSet<GroundAtom>,
    /// Grounded add effects.
    pub add_effects: BTreeSet<GroundAtom>,
    /// Grounded delete effects.
    pub delete_effects: BTreeSet<GroundAtom>,
}

impl GroundOperator {
    /// Whether all preconditions hold in the given atom set.
    pub fn applicable(&self, atoms: &BTreeSet<GroundAtom>) -> bool {
        self.preconditions.is_subset(atoms)
    }

    /// Successor atom set after applying the effects.
    pub fn apply(&self, atoms: &BTreeSet<GroundAtom>) -> BTreeSet<GroundAtom> {
        let mut next = atoms.clone();
        for atom in &self.add_effects {
            next.insert(atom.clone());
        }
        for atom in &self.delete_effects {
            next.remove(atom);
        }
        next
    }
}

/// A continuous parameter sampler: `(state, objects, rng) -> params`.
///
/// Samplers are shared closures so learned and hand-written samplers plug in
/// interchangeably.
#[derive(Clone)]
pub struct Sampler {
    func: Arc<dyn Fn(&State, &[Object], &mut StdRng) -> Vec<f64>>,
}

impl Sampler {
    /// Wrap a sampler function.
    pub fn new(func: impl Fn(&State, &[Object], &mut StdRng) -> Vec<f64> + 'static) -> Self {
        Self {
            func: Arc::new(func),
        }
    }

    /// Draw a parameter vector.
    pub fn sample(&self, state: &State, objects: &[Object], rng: &mut StdRng) -> Vec<f64> {
        (self.func)(state, objects, rng)
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sampler")
    }
}

/// A neuro-symbolic relational transition: a STRIPS operator bound to a
/// parameterized option and a continuous sampler. The unit the planner
/// searches over and the unit the operator learner produces.
#[derive(Debug, Clone)]
pub struct Nsrt {
    /// Symbolic schema.
    pub op: StripsOperator,
    /// The continuous skill this operator executes through.
    pub option: ParameterizedOption,
    /// Which operator parameters are passed to the option, in option
    /// argument order.
    pub option_vars: Vec<Variable>,
    /// Continuous parameter sampler.
    pub sampler: Sampler,
}

impl Nsrt {
    /// Create an NSRT, checking the option binding against the schema.
    pub fn new(
        op: StripsOperator,
        option: ParameterizedOption,
        option_vars: Vec<Variable>,
        sampler: Sampler,
    ) -> Self {
        let declared: BTreeSet<&Variable> = op.parameters.iter().collect();
        assert!(
            option_vars.iter().all(|v| declared.contains(v)),
            "option binding for {} references undeclared variable",
            op.name
        );
        assert_eq!(
            option_vars.len(),
            option.types().len(),
            "option arity mismatch for {}",
            op.name
        );
        assert!(
            option_vars
                .iter()
                .zip(option.types())
                .all(|(v, t)| &v.ty == t),
            "option argument type mismatch for {}",
            op.name
        );
        Self {
            op,
            option,
            option_vars,
            sampler,
        }
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.op.name
    }

    /// Bind the NSRT to concrete objects.
    pub fn ground(&self, objects: &[Object]) -> GroundNsrt {
        let ground_op = self.op.ground(objects);
        let sub: BTreeMap<&Variable, &Object> =
            self.op.parameters.iter().zip(objects.iter()).collect();
        let option_objects = self
            .option_vars
            .iter()
            .map(|v| (*sub.get(v).expect("option var is a parameter")).clone())
            .collect();
        GroundNsrt {
            nsrt: self.clone(),
            op: ground_op,
            option_objects,
        }
    }
}

impl PartialEq for Nsrt {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.option == other.option && self.option_vars == other.option_vars
    }
}

impl Eq for Nsrt {}

impl PartialOrd for Nsrt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Nsrt {
    fn cmp(&self, other: &Self) -> Ordering {
        self.op.name.cmp(&other.op.name)
    }
}

impl fmt::Display for Nsrt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n  option: {}({})",
            self.op,
            self.option,
            self.option_vars.iter().map(|v| v.name.as_str()).join(", ")
        )
    }
}

/// An NSRT bound to concrete objects.
#[derive(Debug, Clone)]
pub struct GroundNsrt {
    /// The schema this grounding came from.
    pub nsrt: Nsrt,
    /// Grounded symbolic operator.
    pub op: GroundOperator,
    /// Objects passed to the option, positionally matching its types.
    pub option_objects: Vec<Object>,
}

impl GroundNsrt {
    /// Schema name.
    pub fn name(&self) -> &str {
        &self.op.name
    }

    /// Grounded preconditions.
    pub fn preconditions(&self) -> &BTreeSet<GroundAtom> {
        &self.op.preconditions
    }

    /// Grounded add effects.
    pub fn add_effects(&self) -> &BTreeSet<GroundAtom> {
        &self.op.add_effects
    }

    /// Grounded delete effects.
    pub fn delete_effects(&self) -> &BTreeSet<GroundAtom> {
        &self.op.delete_effects
    }

    /// Side predicates of the schema.
    pub fn side_predicates(&self) -> &BTreeSet<Predicate> {
        &self.nsrt.op.side_predicates
    }

    /// Invoke the sampler and bind the option to the result.
    ///
    /// Sampled parameters are clamped into the option's parameter space.
    pub fn sample_option(&self, state: &State, rng: &mut StdRng) -> GroundedOption {
        let params = self.nsrt.sampler.sample(state, &self.op.objects, rng);
        let params = self.nsrt.option.params_space().clamp(params);
        self.nsrt
            .option
            .ground(self.option_objects.clone(), params)
    }
}

impl fmt::Display for GroundNsrt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.op.name,
            self.op.objects.iter().map(|o| o.name()).join(", ")
        )
    }
}

/// All groundings of an NSRT over the given objects, in deterministic
/// order. Duplicate objects within one grounding are allowed.
pub fn all_ground_nsrts(nsrt: &Nsrt, objects: &[Object]) -> Vec<GroundNsrt> {
    let types: Vec<_> = nsrt.op.parameters.iter().map(|v| v.ty.clone()).collect();
    get_object_combinations(objects, &types, true)
        .into_iter()
        .map(|combo| nsrt.ground(&combo))
        .collect()
}
