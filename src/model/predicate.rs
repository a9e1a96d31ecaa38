//! Predicates, ground atoms, lifted atoms, and state abstraction.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use itertools::Itertools;

use crate::model::state::{Object, State, Type};

/// A named boolean capability over a state and an object tuple.
///
/// Wrapping the closure keeps [`Predicate`] equality and hashing
/// well-defined: predicates compare by name and argument types, never by
/// classifier behavior.
#[derive(Clone)]
pub struct Classifier {
    func: Arc<dyn Fn(&State, &[Object]) -> bool>,
}

impl Classifier {
    /// Wrap a classifier function.
    pub fn new(func: impl Fn(&State, &[Object]) -> bool + 'static) -> Self {
        Self {
            func: Arc::new(func),
        }
    }

    /// Evaluate the classifier.
    pub fn eval(&self, state: &State, objects: &[Object]) -> bool {
        (self.func)(state, objects)
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Classifier")
    }
}

/// A named boolean relation over typed objects.
#[derive(Debug, Clone)]
pub struct Predicate {
    name: String,
    types: Vec<Type>,
    classifier: Classifier,
}

impl Predicate {
    /// Create a predicate with the given argument types and classifier.
    pub fn new(name: &str, types: Vec<Type>, classifier: Classifier) -> Self {
        Self {
            name: name.to_string(),
            types,
            classifier,
        }
    }

    /// Predicate name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared argument types.
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// Number of arguments.
    pub fn arity(&self) -> usize {
        self.types.len()
    }

    /// Evaluate the predicate on a concrete object tuple.
    ///
    /// The tuple must match the declared arity and types.
    pub fn holds(&self, state: &State, objects: &[Object]) -> bool {
        debug_assert_eq!(objects.len(), self.types.len(), "arity mismatch for {}", self.name);
        debug_assert!(
            objects.iter().zip(&self.types).all(|(o, t)| o.ty() == t),
            "argument type mismatch for {}",
            self.name
        );
        self.classifier.eval(state, objects)
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.types == other.types
    }
}

impl Eq for Predicate {}

impl Hash for Predicate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        for t in &self.types {
            t.hash(state);
        }
    }
}

impl PartialOrd for Predicate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Predicate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.types.cmp(&other.types))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A typed placeholder used in operator schemas, e.g. `?x0:block`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable {
    /// Variable name, conventionally starting with `?`.
    pub name: String,
    /// The variable's type.
    pub ty: Type,
}

impl Variable {
    /// Create a variable.
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}

/// Fresh variables `?x0, ?x1, ...` for the given types.
pub fn create_new_variables(types: &[Type]) -> Vec<Variable> {
    types
        .iter()
        .enumerate()
        .map(|(i, t)| Variable::new(&format!("?x{i}"), t.clone()))
        .collect()
}

/// A predicate applied to concrete objects: the unit of symbolic state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroundAtom {
    /// The predicate.
    pub predicate: Predicate,
    /// Concrete arguments, matching the predicate's declared types.
    pub objects: Vec<Object>,
}

impl GroundAtom {
    /// Create a ground atom, checking arity and argument types.
    pub fn new(predicate: Predicate, objects: Vec<Object>) -> Self {
        assert_eq!(
            objects.len(),
            predicate.arity(),
            "arity mismatch grounding {predicate}"
        );
        assert!(
            objects.iter().zip(predicate.types()).all(|(o, t)| o.ty() == t),
            "argument type mismatch grounding {predicate}"
        );
        Self { predicate, objects }
    }

    /// Whether this atom holds in the given state.
    pub fn holds(&self, state: &State) -> bool {
        self.predicate.holds(state, &self.objects)
    }

    /// Lift the atom through an object-to-variable mapping.
    ///
    /// Every argument must be present in the mapping.
    pub fn lift(&self, obj_to_var: &BTreeMap<Object, Variable>) -> LiftedAtom {
        let variables = self
            .objects
            .iter()
            .map(|o| obj_to_var[o].clone())
            .collect();
        LiftedAtom::new(self.predicate.clone(), variables)
    }
}

impl fmt::Display for GroundAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.predicate,
            self.objects.iter().map(|o| o.name()).join(", ")
        )
    }
}

/// A predicate applied to typed variables: the unit of operator schemas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiftedAtom {
    /// The predicate.
    pub predicate: Predicate,
    /// Variable arguments, matching the predicate's declared types.
    pub variables: Vec<Variable>,
}

impl LiftedAtom {
    /// Create a lifted atom, checking arity and argument types.
    pub fn new(predicate: Predicate, variables: Vec<Variable>) -> Self {
        assert_eq!(
            variables.len(),
            predicate.arity(),
            "arity mismatch lifting {predicate}"
        );
        assert!(
            variables
                .iter()
                .zip(predicate.types())
                .all(|(v, t)| &v.ty == t),
            "variable type mismatch lifting {predicate}"
        );
        Self {
            predicate,
            variables,
        }
    }

    /// Ground the atom through a variable-to-object substitution.
    ///
    /// Every variable must be present in the substitution.
    pub fn ground(&self, var_to_obj: &BTreeMap<Variable, Object>) -> GroundAtom {
        let objects = self
            .variables
            .iter()
            .map(|v| var_to_obj[v].clone())
            .collect();
        GroundAtom::new(self.predicate.clone(), objects)
    }
}

impl fmt::Display for LiftedAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.predicate,
            self.variables.iter().map(|v| v.name.as_str()).join(", ")
        )
    }
}

/// All object tuples matching a type signature, in deterministic order.
///
/// With `allow_duplicates` false, tuples with a repeated object are skipped.
pub fn get_object_combinations(
    objects: &[Object],
    types: &[Type],
    allow_duplicates: bool,
) -> Vec<Vec<Object>> {
    if types.is_empty() {
        return vec![vec![]];
    }
    let mut by_type: BTreeMap<Type, Vec<Object>> = BTreeMap::new();
    let mut sorted = objects.to_vec();
    sorted.sort();
    for obj in sorted {
        by_type.entry(obj.ty().clone()).or_default().push(obj);
    }
    let empty: Vec<Object> = Vec::new();
    let choices: Vec<&Vec<Object>> = types
        .iter()
        .map(|t| by_type.get(t).unwrap_or(&empty))
        .collect();
    choices
        .iter()
        .map(|c| c.iter())
        .multi_cartesian_product()
        .filter(|combo| {
            allow_duplicates || combo.iter().collect::<BTreeSet<_>>().len() == combo.len()
        })
        .map(|combo| combo.into_iter().cloned().collect())
        .collect()
}

/// The symbolic abstraction of a state: every ground atom that holds.
///
/// Duplicate arguments within one atom are disallowed, matching the
/// convention that relations over an object and itself are not meaningful.
pub fn abstract_state(state: &State, predicates: &BTreeSet<Predicate>) -> BTreeSet<GroundAtom> {
    let objects: Vec<Object> = state.objects().cloned().collect();
    let mut atoms = BTreeSet::new();
    for pred in predicates {
        for combo in get_object_combinations(&objects, pred.types(), false) {
            if pred.holds(state, &combo) {
                atoms.insert(GroundAtom::new(pred.clone(), combo));
            }
        }
    }
    atoms
}
