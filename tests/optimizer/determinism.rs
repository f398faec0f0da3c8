use std::time::Duration;

use acqopt::optimizer::{DifferentialEvolutionFactory, VectorizedOptimizer, VectorizedOptimizerFactory};
use acqopt::prelude::*;

use crate::{acquisition, mixed_problem, peaked_score};

fn outcome(trials: &[Trial]) -> Vec<(ParameterDict, f64)> {
    trials
        .iter()
        .map(|t| (t.parameters.clone(), acquisition(t)))
        .collect()
}

#[test]
fn same_seed_same_trials() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizerFactory::new(DifferentialEvolutionFactory::default())
        .create(10, 300);

    let a = optimizer.optimize(&converter, &peaked_score, 4, None, Some(42)).unwrap();
    let b = optimizer.optimize(&converter, &peaked_score, 4, None, Some(42)).unwrap();
    let c = optimizer.optimize(&converter, &peaked_score, 4, None, Some(43)).unwrap();
    assert_eq!(outcome(&a), outcome(&b));
    assert_ne!(outcome(&a), outcome(&c));
}

#[test]
fn missing_seed_means_zero() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(5)
        .max_evaluations(50)
        .build();
    let a = optimizer.optimize(&converter, &peaked_score, 3, None, None).unwrap();
    let b = optimizer.optimize(&converter, &peaked_score, 3, None, Some(0)).unwrap();
    assert_eq!(outcome(&a), outcome(&b));
}

#[test]
fn loop_modes_agree() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let build = |jit: bool| {
        VectorizedOptimizer::builder(DifferentialEvolutionFactory::default())
            .suggestion_batch_size(8)
            .max_evaluations(240)
            .jit_loop(jit)
            .build()
    };
    let folded = build(true)
        .optimize(&converter, &peaked_score, 6, None, Some(9))
        .unwrap();
    let looped = build(false)
        .optimize(&converter, &peaked_score, 6, None, Some(9))
        .unwrap();
    assert_eq!(outcome(&folded), outcome(&looped));
}

#[test]
fn max_duration_does_not_cut_the_loop() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(5)
        .max_evaluations(100)
        .max_duration(Duration::ZERO)
        .build();
    let (_, summary) = optimizer
        .optimize_with_summary(&converter, &peaked_score, 1, None, Some(1))
        .unwrap();
    assert_eq!(summary.evaluations, 100);
}
