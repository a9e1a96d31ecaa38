//! Planner Integration Tests
//!
//! Exercises the SeSamE planner end to end against the blocks-world
//! fixture: plan shape, soundness under execution, determinism, and the
//! timeout failure channel.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::{execute_policy, oracle_nsrts, BlocksEnv};
use tamp_planner::config::{Config, PlannerConfig};
use tamp_planner::env::Environment;
use tamp_planner::model::Sampler;
use tamp_planner::planning::sesame_plan;
use tamp_planner::refinement::SkeletonLengthEstimator;
use tamp_planner::{Error, TampSolver};

const TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn test_stacking_plan_has_four_steps() {
    common::init_tracing();
    let env = BlocksEnv::new();
    let nsrts = oracle_nsrts(&env);
    let task = env.test_tasks().remove(0);
    let config = PlannerConfig::default();
    let report = sesame_plan(
        &task,
        &|s, a| env.simulate(s, a),
        &nsrts,
        &env.predicate_set(),
        &SkeletonLengthEstimator,
        &config,
        TIMEOUT,
        0,
    )
    .expect("planning should succeed");
    assert_eq!(report.plan.len(), 4);
    let names: Vec<&str> = report.plan.iter().map(|o| o.name()).collect();
    assert_eq!(
        names,
        vec!["PickSkill", "StackSkill", "PickSkill", "StackSkill"]
    );
    // pick b1, stack on b0, pick b2, stack on b1
    assert_eq!(report.plan[0].objects()[1].name(), "b1");
    assert_eq!(report.plan[1].objects()[2].name(), "b0");
    assert_eq!(report.plan[2].objects()[1].name(), "b2");
    assert_eq!(report.plan[3].objects()[2].name(), "b1");
    assert_eq!(report.metrics.plan_length, 4);
}

#[test]
fn test_executed_plan_reaches_goal() {
    let env = BlocksEnv::new();
    let task = env.test_tasks().remove(0);
    let mut solver =
        TampSolver::new(env.predicate_set(), Config::default(), 0).expect("solver");
    solver.set_nsrts(oracle_nsrts(&env));
    let mut policy = solver
        .solve(&task, &|s, a| env.simulate(s, a), TIMEOUT)
        .expect("solve");
    let (states, actions) = execute_policy(&mut policy, &env, &task.init);
    assert_eq!(actions.len(), 4);
    assert!(task.goal_holds(states.last().expect("nonempty")));
    // Executed actions carry their producing options.
    assert!(actions.iter().all(|a| a.has_option()));
}

#[test]
fn test_planning_is_deterministic() {
    let env = BlocksEnv::new();
    let nsrts = oracle_nsrts(&env);
    let task = env.test_tasks().remove(0);
    let config = PlannerConfig::default();
    let plan_once = || {
        sesame_plan(
            &task,
            &|s, a| env.simulate(s, a),
            &nsrts,
            &env.predicate_set(),
            &SkeletonLengthEstimator,
            &config,
            TIMEOUT,
            42,
        )
        .expect("planning should succeed")
        .plan
    };
    assert_eq!(plan_once(), plan_once());
}

#[test]
fn test_repeated_solver_calls_replay() {
    let env = BlocksEnv::new();
    let task = env.test_tasks().remove(0);
    let run = || {
        let mut solver =
            TampSolver::new(env.predicate_set(), Config::default(), 7).expect("solver");
        solver.set_nsrts(oracle_nsrts(&env));
        let mut policy = solver
            .solve(&task, &|s, a| env.simulate(s, a), TIMEOUT)
            .expect("solve");
        let (states, _) = execute_policy(&mut policy, &env, &task.init);
        states.len()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_near_zero_timeout_raises_timeout() {
    let env = BlocksEnv::new();
    let nsrts = oracle_nsrts(&env);
    let task = env.test_tasks().remove(0);
    let config = PlannerConfig::default();
    let result = sesame_plan(
        &task,
        &|s, a| env.simulate(s, a),
        &nsrts,
        &env.predicate_set(),
        &SkeletonLengthEstimator,
        &config,
        Duration::from_nanos(1),
        0,
    );
    assert!(matches!(result, Err(Error::Timeout(_))));
}

#[test]
fn test_timeout_during_refinement_carries_partials() {
    let env = BlocksEnv::new();
    // Break the stack sampler: 0.5 never satisfies |dx| <= 0.1, so
    // refinement spins on the stack step until the deadline.
    let mut nsrts = oracle_nsrts(&env);
    for nsrt in &mut nsrts {
        if nsrt.name() == "Stack" {
            *nsrt = tamp_planner::Nsrt::new(
                nsrt.op.clone(),
                nsrt.option.clone(),
                nsrt.option_vars.clone(),
                Sampler::new(|_, _, _| vec![0.5]),
            );
        }
    }
    let task = env.test_tasks().remove(0);
    let mut config = PlannerConfig::default();
    config.max_samples_per_step = 1_000_000;
    let result = sesame_plan(
        &task,
        &|s, a| env.simulate(s, a),
        &nsrts,
        &env.predicate_set(),
        &SkeletonLengthEstimator,
        &config,
        Duration::from_millis(300),
        0,
    );
    match result {
        Err(Error::Timeout(info)) => {
            assert_eq!(info.phase, "refinement");
            assert!(!info.partial_refinements.is_empty());
            // The pick step refines; the stack step never does.
            let deepest = info
                .partial_refinements
                .iter()
                .map(|p| p.options.len())
                .max()
                .expect("nonempty");
            assert!(deepest >= 1);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn test_unreachable_goal_fails_fast() {
    let env = BlocksEnv::new();
    // Only the Pick operator: On(b1, b0) can never be achieved.
    let nsrts: Vec<_> = oracle_nsrts(&env)
        .into_iter()
        .filter(|n| n.name() == "Pick")
        .collect();
    let task = env.test_tasks().remove(0);
    let config = PlannerConfig::default();
    let result = sesame_plan(
        &task,
        &|s, a| env.simulate(s, a),
        &nsrts,
        &env.predicate_set(),
        &SkeletonLengthEstimator,
        &config,
        TIMEOUT,
        0,
    );
    match result {
        Err(Error::Planning(info)) => {
            assert!(info.reason.contains("reachable"));
            assert_eq!(info.skeletons_tried, 0);
        }
        other => panic!("expected planning failure, got {other:?}"),
    }
}

#[test]
fn test_exhausted_policy_signals_completion() {
    let env = BlocksEnv::new();
    let task = env.test_tasks().remove(0);
    let mut solver =
        TampSolver::new(env.predicate_set(), Config::default(), 0).expect("solver");
    solver.set_nsrts(oracle_nsrts(&env));
    let mut policy = solver
        .solve(&task, &|s, a| env.simulate(s, a), TIMEOUT)
        .expect("solve");
    let (states, _) = execute_policy(&mut policy, &env, &task.init);
    // Execution already drained the queue; the next query must keep
    // signalling exhaustion rather than acting.
    let last = states.last().expect("nonempty");
    assert!(matches!(
        policy.next_action(last),
        Err(Error::PlanExhausted)
    ));
}

#[test]
fn test_goal_count_heuristic_also_solves() {
    let env = BlocksEnv::new();
    let nsrts = oracle_nsrts(&env);
    let task = env.train_tasks().remove(0);
    let mut config = PlannerConfig::default();
    config.task_planning_heuristic = "goal_count".to_string();
    let report = sesame_plan(
        &task,
        &|s, a| env.simulate(s, a),
        &nsrts,
        &env.predicate_set(),
        &SkeletonLengthEstimator,
        &config,
        TIMEOUT,
        0,
    )
    .expect("planning should succeed");
    assert_eq!(report.plan.len(), 2);
}

#[test]
fn test_random_sampling_backtracks_to_success() {
    let env = BlocksEnv::new();
    // Replace every sampler with uniform sampling over the parameter
    // space; only a fraction of draws satisfy the initiation windows, so
    // success requires resampling and backtracking.
    let nsrts: Vec<_> = oracle_nsrts(&env)
        .into_iter()
        .map(|nsrt| {
            let space = nsrt.option.params_space().clone();
            tamp_planner::Nsrt::new(
                nsrt.op.clone(),
                nsrt.option.clone(),
                nsrt.option_vars.clone(),
                Sampler::new(move |_, _, rng| space.sample(rng)),
            )
        })
        .collect();
    let task = env.train_tasks().remove(0);
    let mut config = PlannerConfig::default();
    config.max_samples_per_step = 50;
    let report = sesame_plan(
        &task,
        &|s, a| env.simulate(s, a),
        &nsrts,
        &env.predicate_set(),
        &SkeletonLengthEstimator,
        &config,
        TIMEOUT,
        3,
    )
    .expect("planning should succeed");
    assert_eq!(report.plan.len(), 2);
    assert!(report.metrics.num_samples > 2, "expected resampling");
}
