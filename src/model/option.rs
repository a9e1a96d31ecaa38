//! Parameterized options: continuous skills with typed object arguments and
//! a bounded parameter vector.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use crate::model::state::{Action, Object, State, Type};

/// A rectangular bound over continuous vectors, used for option parameter
/// spaces and environment action spaces.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSpace {
    low: Vec<f64>,
    high: Vec<f64>,
}

impl BoxSpace {
    /// Create a space with per-dimension bounds.
    ///
    /// Panics if the bounds disagree in length or are inverted.
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Self {
        assert_eq!(low.len(), high.len(), "bound length mismatch");
        assert!(
            low.iter().zip(&high).all(|(l, h)| l <= h),
            "inverted bounds"
        );
        Self { low, high }
    }

    /// A zero-dimensional space.
    pub fn empty() -> Self {
        Self {
            low: vec![],
            high: vec![],
        }
    }

    /// Dimensionality.
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Lower bounds.
    pub fn low(&self) -> &[f64] {
        &self.low
    }

    /// Upper bounds.
    pub fn high(&self) -> &[f64] {
        &self.high
    }

    /// Whether a vector lies within the bounds.
    pub fn contains(&self, vec: &[f64]) -> bool {
        vec.len() == self.dim()
            && vec
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(v, (l, h))| l <= v && v <= h)
    }

    /// Clamp a vector into the bounds, dimension by dimension.
    pub fn clamp(&self, vec: Vec<f64>) -> Vec<f64> {
        assert_eq!(vec.len(), self.dim(), "dimension mismatch");
        vec.into_iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(v, (l, h))| v.clamp(*l, *h))
            .collect()
    }

    /// Draw a uniform sample from the space.
    pub fn sample(&self, rng: &mut StdRng) -> Vec<f64> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(l, h)| if l == h { *l } else { rng.gen_range(*l..*h) })
            .collect()
    }
}

type OptionPolicy = Arc<dyn Fn(&State, &[Object], &[f64]) -> Action>;
type OptionCondition = Arc<dyn Fn(&State, &[Object], &[f64]) -> bool>;

/// A continuous skill schema: typed object arguments, a bounded parameter
/// vector, and policy / initiation / termination functions.
///
/// Options compare and hash by name; names are expected to be unique within
/// an environment.
#[derive(Clone)]
pub struct ParameterizedOption {
    name: String,
    types: Vec<Type>,
    params_space: BoxSpace,
    policy: OptionPolicy,
    initiable: OptionCondition,
    terminal: OptionCondition,
}

impl ParameterizedOption {
    /// Create an option schema.
    pub fn new(
        name: &str,
        types: Vec<Type>,
        params_space: BoxSpace,
        policy: impl Fn(&State, &[Object], &[f64]) -> Action + 'static,
        initiable: impl Fn(&State, &[Object], &[f64]) -> bool + 'static,
        terminal: impl Fn(&State, &[Object], &[f64]) -> bool + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            types,
            params_space,
            policy: Arc::new(policy),
            initiable: Arc::new(initiable),
            terminal: Arc::new(terminal),
        }
    }

    /// A placeholder skill for segments whose actions carry no option tag.
    ///
    /// It binds no objects, takes no parameters, and is never executable.
    pub fn no_option() -> Self {
        Self::new(
            "NoOption",
            vec![],
            BoxSpace::empty(),
            |_, _, _| Action::new(vec![]),
            |_, _, _| false,
            |_, _, _| true,
        )
    }

    /// Option name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared object argument types.
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// Bounds of the continuous parameter vector.
    pub fn params_space(&self) -> &BoxSpace {
        &self.params_space
    }

    /// Bind the option to concrete objects and parameter values.
    pub fn ground(&self, objects: Vec<Object>, params: Vec<f64>) -> GroundedOption {
        assert_eq!(objects.len(), self.types.len(), "arity mismatch grounding {}", self.name);
        assert!(
            objects.iter().zip(&self.types).all(|(o, t)| o.ty() == t),
            "argument type mismatch grounding {}",
            self.name
        );
        assert_eq!(params.len(), self.params_space.dim(), "parameter dimension mismatch grounding {}", self.name);
        GroundedOption {
            parent: self.clone(),
            objects,
            params,
        }
    }
}

// Closures rule out a derived Debug; show the declarative parts.
impl fmt::Debug for ParameterizedOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterizedOption")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("params_space", &self.params_space)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ParameterizedOption {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ParameterizedOption {}

impl Hash for ParameterizedOption {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for ParameterizedOption {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParameterizedOption {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for ParameterizedOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An option bound to concrete objects and parameter values.
#[derive(Debug, Clone)]
pub struct GroundedOption {
    parent: ParameterizedOption,
    objects: Vec<Object>,
    params: Vec<f64>,
}

impl GroundedOption {
    /// The option schema.
    pub fn parent(&self) -> &ParameterizedOption {
        &self.parent
    }

    /// Bound objects.
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Bound parameter values.
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        self.parent.name()
    }

    /// Produce the next action, tagged with this option and the step index.
    pub fn policy(&self, state: &State, step: usize) -> Action {
        let mut action = (self.parent.policy)(state, &self.objects, &self.params);
        action.set_option(self.clone(), step);
        action
    }

    /// Whether the option may start in the given state.
    pub fn initiable(&self, state: &State) -> bool {
        (self.parent.initiable)(state, &self.objects, &self.params)
    }

    /// Whether the option has finished in the given state.
    pub fn terminal(&self, state: &State) -> bool {
        (self.parent.terminal)(state, &self.objects, &self.params)
    }
}

impl PartialEq for GroundedOption {
    fn eq(&self, other: &Self) -> bool {
        self.parent == other.parent
            && self.objects == other.objects
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for GroundedOption {}

impl fmt::Display for GroundedOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.parent.name(),
            self.objects
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}
