//! Sampler learning strategies.
//!
//! Each learned operator needs a continuous sampler proposing option
//! parameters during refinement. Strategies are pluggable by name:
//! ground-truth passthrough, uniform sampling, or a diagonal Gaussian fit
//! to the parameters that succeeded in the operator's datastore.

use std::collections::BTreeMap;

use rand_distr::{Distribution, Normal};
use tracing::warn;

use crate::config::LearnerConfig;
use crate::learning::strips::Pnad;
use crate::model::{BoxSpace, Sampler, Segment};
use crate::{Error, Result};

/// Fits one sampler per learned operator.
pub trait SamplerLearner {
    /// Strategy name.
    fn name(&self) -> &'static str;

    /// Fit a sampler from the operator's supporting segments.
    fn learn(&self, pnad: &Pnad, segments: &[Segment]) -> Result<Sampler>;
}

/// Create a sampler learner by name. `oracle_samplers` maps option names to
/// ground-truth samplers and is only consulted by the oracle strategy.
pub fn create_sampler_learner(
    name: &str,
    oracle_samplers: &BTreeMap<String, Sampler>,
    config: &LearnerConfig,
) -> Result<Box<dyn SamplerLearner>> {
    match name {
        "oracle" => Ok(Box::new(OracleSamplerLearner {
            samplers: oracle_samplers.clone(),
        })),
        "random" => Ok(Box::new(RandomSamplerLearner)),
        "gaussian" => Ok(Box::new(GaussianSamplerLearner {
            std_floor: config.gaussian_std_floor,
        })),
        other => Err(Error::NotImplemented(format!(
            "unknown sampler learner: {other}"
        ))),
    }
}

/// No learning: hand back the environment's ground-truth sampler.
struct OracleSamplerLearner {
    samplers: BTreeMap<String, Sampler>,
}

impl SamplerLearner for OracleSamplerLearner {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn learn(&self, pnad: &Pnad, _segments: &[Segment]) -> Result<Sampler> {
        self.samplers
            .get(pnad.option.name())
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!(
                    "no oracle sampler registered for option {}",
                    pnad.option
                ))
            })
    }
}

/// Uniform sampling over the option's parameter space.
struct RandomSamplerLearner;

impl SamplerLearner for RandomSamplerLearner {
    fn name(&self) -> &'static str {
        "random"
    }

    fn learn(&self, pnad: &Pnad, _segments: &[Segment]) -> Result<Sampler> {
        Ok(uniform_sampler(pnad.option.params_space().clone()))
    }
}

/// A diagonal Gaussian over option parameters, fit to the parameter
/// vectors observed in the operator's datastore. Conditioning is on the
/// operator's lifted object bindings only; the state is not consulted.
struct GaussianSamplerLearner {
    std_floor: f64,
}

impl SamplerLearner for GaussianSamplerLearner {
    fn name(&self) -> &'static str {
        "gaussian"
    }

    fn learn(&self, pnad: &Pnad, segments: &[Segment]) -> Result<Sampler> {
        let data: Vec<&[f64]> = pnad
            .datastore
            .iter()
            .filter_map(|entry| segments[entry.segment].option().map(|o| o.params()))
            .collect();
        let dim = pnad.option.params_space().dim();
        if data.is_empty() {
            warn!(
                operator = %pnad.op.name,
                "no parameter data in datastore; falling back to uniform sampling"
            );
            return Ok(uniform_sampler(pnad.option.params_space().clone()));
        }
        let mut dists = Vec::with_capacity(dim);
        for d in 0..dim {
            let n = data.len() as f64;
            let mean = data.iter().map(|p| p[d]).sum::<f64>() / n;
            let var = data.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt().max(self.std_floor);
            let dist = Normal::new(mean, std)
                .map_err(|e| Error::Learning(format!("gaussian fit failed: {e}")))?;
            dists.push(dist);
        }
        Ok(Sampler::new(move |_state, _objects, rng| {
            dists.iter().map(|d| d.sample(rng)).collect()
        }))
    }
}

fn uniform_sampler(space: BoxSpace) -> Sampler {
    Sampler::new(move |_state, _objects, rng| space.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::strips::DatastoreEntry;
    use crate::model::{
        Action, BoxSpace, Classifier, GroundAtom, LiftedAtom, Object, ParameterizedOption,
        Predicate, State, StripsOperator, Type, Variable,
    };
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn fixture() -> (Vec<Segment>, Pnad) {
        let ty = Type::new("block", &["held"]);
        let held = Predicate::new(
            "Held",
            vec![ty.clone()],
            Classifier::new(|s, o| s.get(&o[0], "held") > 0.5),
        );
        let opt = ParameterizedOption::new(
            "PickSkill",
            vec![ty.clone()],
            BoxSpace::new(vec![-1.0], vec![1.0]),
            |_, _, p| Action::new(vec![p[0]]),
            |_, _, _| true,
            |_, _, _| true,
        );
        let block = Object::new("b0", ty.clone());
        let before = State::new([(block.clone(), vec![0.0])]);
        let after = State::new([(block.clone(), vec![1.0])]);
        let segments: Vec<Segment> = [0.2, 0.3, 0.4]
            .iter()
            .map(|p| {
                let grounded = opt.ground(vec![block.clone()], vec![*p]);
                let action = grounded.policy(&before, 0);
                Segment::new(
                    vec![before.clone(), after.clone()],
                    vec![action],
                    BTreeSet::new(),
                    BTreeSet::from([GroundAtom::new(held.clone(), vec![block.clone()])]),
                    Some(grounded),
                )
            })
            .collect();
        let var = Variable::new("?x0", ty);
        let op = StripsOperator::new(
            "Pick",
            vec![var.clone()],
            BTreeSet::new(),
            BTreeSet::from([LiftedAtom::new(held, vec![var.clone()])]),
            BTreeSet::new(),
            BTreeSet::new(),
        );
        let pnad = Pnad {
            op,
            option: opt,
            option_vars: vec![var.clone()],
            datastore: (0..3)
                .map(|i| DatastoreEntry {
                    segment: i,
                    var_to_obj: BTreeMap::from([(var.clone(), block.clone())]),
                })
                .collect(),
        };
        (segments, pnad)
    }

    #[test]
    fn test_gaussian_fits_near_data_mean() {
        let (segments, pnad) = fixture();
        let config = LearnerConfig::default();
        let learner =
            create_sampler_learner("gaussian", &BTreeMap::new(), &config).expect("learner");
        let sampler = learner.learn(&pnad, &segments).expect("fit");
        let state = &segments[0].states[0];
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<f64> = (0..200)
            .map(|_| sampler.sample(state, &[], &mut rng)[0])
            .collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        // Data mean is 0.3; fitted std is small.
        assert!((mean - 0.3).abs() < 0.1, "mean was {mean}");
    }

    #[test]
    fn test_oracle_requires_registration() {
        let (segments, pnad) = fixture();
        let config = LearnerConfig::default();
        let learner = create_sampler_learner("oracle", &BTreeMap::new(), &config).expect("learner");
        assert!(matches!(
            learner.learn(&pnad, &segments),
            Err(Error::Config(_))
        ));
        let registered = BTreeMap::from([(
            "PickSkill".to_string(),
            Sampler::new(|_, _, _| vec![0.0]),
        )]);
        let learner = create_sampler_learner("oracle", &registered, &config).expect("learner");
        assert!(learner.learn(&pnad, &segments).is_ok());
    }

    #[test]
    fn test_random_sampler_stays_in_space() {
        let (segments, pnad) = fixture();
        let config = LearnerConfig::default();
        let learner = create_sampler_learner("random", &BTreeMap::new(), &config).expect("learner");
        let sampler = learner.learn(&pnad, &segments).expect("fit");
        let state = &segments[0].states[0];
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..20 {
            let params = sampler.sample(state, &[], &mut rng);
            assert!(pnad.option.params_space().contains(&params));
        }
    }

    #[test]
    fn test_unknown_sampler_learner() {
        let config = LearnerConfig::default();
        assert!(matches!(
            create_sampler_learner("nope", &BTreeMap::new(), &config),
            Err(Error::NotImplemented(_))
        ));
    }
}
