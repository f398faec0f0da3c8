#![cfg(feature = "serde")]

use acqopt::optimizer::{DEStrategy, VectorizedOptimizer};
use acqopt::prelude::*;
use nalgebra::{DMatrix, DVector};

#[test]
fn problem_statement_round_trip() {
    let problem = ProblemStatement::new(
        SearchSpace::new()
            .add_log_float("lr", 1e-4, 1.0)
            .add_int("layers", 1, 8)
            .add_categorical("act", ["relu", "tanh"]),
    )
    .with_metric(MetricInformation::minimize("loss"));

    let json = serde_json::to_string(&problem).unwrap();
    let loaded: ProblemStatement = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded, problem);
}

#[test]
fn optimized_trials_round_trip() {
    let problem = ProblemStatement::new(SearchSpace::new().add_float("x", 0.0, 1.0));
    let converter = TrialToArrayConverter::from_problem(&problem).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(5)
        .max_evaluations(20)
        .build();
    let score = |xs: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> {
        Ok(DVector::from_fn(xs.nrows(), |i, _| xs[(i, 0)]))
    };
    let trials = optimizer
        .optimize(&converter, &score, 2, None, Some(1))
        .unwrap();

    let json = serde_json::to_string(&trials).unwrap();
    let loaded: Vec<Trial> = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded, trials);
    assert_eq!(loaded[0].state, TrialState::Completed);
}

#[test]
fn de_strategy_serializes_by_name() {
    let json = serde_json::to_string(&DEStrategy::CurrentToBest1).unwrap();
    assert_eq!(json, "\"CurrentToBest1\"");
    let back: DEStrategy = serde_json::from_str(&json).unwrap();
    assert_eq!(back, DEStrategy::CurrentToBest1);
}
