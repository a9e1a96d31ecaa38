//! Types, objects, continuous states, and low-level actions.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::model::option::GroundedOption;

/// A category of objects with a fixed, ordered list of feature names.
///
/// Types are immutable once created and cheap to clone. Two types are
/// considered the same when their names match; type names are expected to
/// be unique within an environment.
#[derive(Debug, Clone)]
pub struct Type {
    inner: Arc<TypeInner>,
}

#[derive(Debug)]
struct TypeInner {
    name: String,
    feature_names: Vec<String>,
}

impl Type {
    /// Create a new type with the given feature layout.
    pub fn new(name: &str, feature_names: &[&str]) -> Self {
        Self {
            inner: Arc::new(TypeInner {
                name: name.to_string(),
                feature_names: feature_names.iter().map(|f| f.to_string()).collect(),
            }),
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of features an object of this type carries.
    pub fn dim(&self) -> usize {
        self.inner.feature_names.len()
    }

    /// Ordered feature names.
    pub fn feature_names(&self) -> &[String] {
        &self.inner.feature_names
    }

    /// Position of a feature within the feature vector.
    pub fn feature_index(&self, feature: &str) -> Option<usize> {
        self.inner.feature_names.iter().position(|f| f == feature)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

impl PartialOrd for Type {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Type {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.name.cmp(&other.inner.name)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.name)
    }
}

/// A named instance of a [`Type`].
#[derive(Debug, Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

#[derive(Debug)]
struct ObjectInner {
    name: String,
    ty: Type,
}

impl Object {
    /// Create an object of the given type.
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                name: name.to_string(),
                ty,
            }),
        }
    }

    /// Object name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The object's type.
    pub fn ty(&self) -> &Type {
        &self.inner.ty
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name && self.inner.ty == other.inner.ty
    }
}

impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

impl PartialOrd for Object {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Object {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner
            .name
            .cmp(&other.inner.name)
            .then_with(|| self.inner.ty.cmp(&other.inner.ty))
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.inner.name, self.inner.ty)
    }
}

/// A complete continuous state: every object mapped to its feature vector.
///
/// States compare and hash by content. Simulators never mutate a state in
/// place; they clone it and return the modified copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    data: BTreeMap<Object, Vec<f64>>,
}

impl State {
    /// Build a state from object/feature-vector pairs.
    ///
    /// Panics if a feature vector's length does not match its object's type.
    pub fn new(data: impl IntoIterator<Item = (Object, Vec<f64>)>) -> Self {
        let data: BTreeMap<Object, Vec<f64>> = data.into_iter().collect();
        for (obj, feats) in &data {
            assert_eq!(
                feats.len(),
                obj.ty().dim(),
                "feature vector length mismatch for {obj}"
            );
        }
        Self { data }
    }

    /// Objects in the state, in deterministic (name) order.
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.data.keys()
    }

    /// All objects of the given type, in deterministic order.
    pub fn objects_of_type(&self, ty: &Type) -> Vec<Object> {
        self.data
            .keys()
            .filter(|o| o.ty() == ty)
            .cloned()
            .collect()
    }

    /// Whether the state contains the given object.
    pub fn contains(&self, obj: &Object) -> bool {
        self.data.contains_key(obj)
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the state holds no objects.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read one feature of one object.
    ///
    /// Panics if the object is absent or the feature name is unknown for its
    /// type. Predicate classifiers rely on this lookup; a miss means the
    /// environment's declared types and predicates disagree.
    pub fn get(&self, obj: &Object, feature: &str) -> f64 {
        let feats = self
            .data
            .get(obj)
            .unwrap_or_else(|| panic!("object {obj} not in state"));
        let idx = obj
            .ty()
            .feature_index(feature)
            .unwrap_or_else(|| panic!("type {} has no feature {feature}", obj.ty()));
        feats[idx]
    }

    /// The full feature vector of one object.
    pub fn features(&self, obj: &Object) -> &[f64] {
        self.data
            .get(obj)
            .unwrap_or_else(|| panic!("object {obj} not in state"))
    }

    /// Overwrite one feature of one object. Callers clone the state first;
    /// see [`State`] for the no-in-place-mutation convention.
    pub fn set(&mut self, obj: &Object, feature: &str, value: f64) {
        let idx = obj
            .ty()
            .feature_index(feature)
            .unwrap_or_else(|| panic!("type {} has no feature {feature}", obj.ty()));
        let feats = self
            .data
            .get_mut(obj)
            .unwrap_or_else(|| panic!("object {obj} not in state"));
        feats[idx] = value;
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (obj, feats) in &self.data {
            obj.hash(state);
            for f in feats {
                f.to_bits().hash(state);
            }
        }
    }
}

/// A low-level action: a raw continuous command vector, optionally tagged
/// with the grounded option that produced it and the step index within that
/// option's execution.
#[derive(Debug, Clone)]
pub struct Action {
    /// Raw command vector, interpreted by the environment's simulator.
    pub arr: Vec<f64>,
    option: Option<(GroundedOption, usize)>,
}

impl Action {
    /// An untagged action.
    pub fn new(arr: Vec<f64>) -> Self {
        Self { arr, option: None }
    }

    /// Whether this action carries an option tag.
    pub fn has_option(&self) -> bool {
        self.option.is_some()
    }

    /// The grounded option that produced this action, if known.
    pub fn option(&self) -> Option<&GroundedOption> {
        self.option.as_ref().map(|(o, _)| o)
    }

    /// The step index within the producing option's execution, if known.
    pub fn option_index(&self) -> Option<usize> {
        self.option.as_ref().map(|(_, i)| *i)
    }

    /// Attach an option tag.
    pub fn set_option(&mut self, option: GroundedOption, index: usize) {
        self.option = Some((option, index));
    }

    /// Remove the option tag.
    pub fn unset_option(&mut self) {
        self.option = None;
    }
}
