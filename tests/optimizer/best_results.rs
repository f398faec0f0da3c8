use acqopt::optimizer::{DEStrategy, DifferentialEvolutionFactory, VectorizedOptimizer};
use acqopt::prelude::*;
use nalgebra::{DMatrix, DVector};

use crate::{acquisition, mixed_problem, peaked_score};

#[test]
fn returns_count_trials_sorted_descending() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(20)
        .max_evaluations(400)
        .build();

    let trials = optimizer
        .optimize(&converter, &peaked_score, 5, None, Some(3))
        .unwrap();

    assert_eq!(trials.len(), 5);
    for pair in trials.windows(2) {
        assert!(acquisition(&pair[0]) >= acquisition(&pair[1]));
    }
    for trial in &trials {
        assert!(trial.is_completed());
        assert!(trial.parameters.contains_key("x"));
        assert!(trial.parameters.contains_key("c"));
    }
}

#[test]
fn best_reward_matches_brute_force_maximum() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(10)
        .max_evaluations(100)
        .build();

    let seen = std::sync::Mutex::new(Vec::new());
    let recording_score = |xs: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> {
        let rewards = peaked_score(xs)?;
        seen.lock().unwrap().extend(rewards.iter().copied());
        Ok(rewards)
    };
    let (trials, summary) = optimizer
        .optimize_with_summary(&converter, &recording_score, 3, None, Some(0))
        .unwrap();

    let mut all = seen.into_inner().unwrap();
    all.sort_by(|a, b| b.total_cmp(a));
    assert_eq!(all.len(), 100);
    assert_eq!(summary.evaluations, 100);
    assert_eq!(summary.num_steps, 10);
    assert_eq!(summary.best_reward, Some(all[0]));
    for (trial, expected) in trials.iter().zip(&all) {
        assert!((acquisition(trial) - expected).abs() < 1e-12);
    }
}

#[test]
fn fewer_evaluations_than_count() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(4)
        .max_evaluations(4)
        .build();
    let trials = optimizer
        .optimize(&converter, &peaked_score, 10, None, None)
        .unwrap();
    assert_eq!(trials.len(), 4);

    let idle = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(8)
        .max_evaluations(5)
        .build();
    let (trials, summary) = idle
        .optimize_with_summary(&converter, &peaked_score, 2, None, None)
        .unwrap();
    assert!(trials.is_empty());
    assert_eq!(summary.evaluations, 0);
    assert_eq!(summary.best_reward, None);
}

#[test]
fn differential_evolution_finds_the_peak() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    for strategy in [DEStrategy::Rand1, DEStrategy::Best1, DEStrategy::CurrentToBest1] {
        let factory = DifferentialEvolutionFactory::builder()
            .strategy(strategy)
            .build();
        let optimizer = VectorizedOptimizer::builder(factory)
            .suggestion_batch_size(16)
            .max_evaluations(1_600)
            .build();
        let trials = optimizer
            .optimize(&converter, &peaked_score, 1, None, Some(5))
            .unwrap();

        let best = &trials[0];
        assert_eq!(best.parameters["c"], ParamValue::Categorical(1), "{strategy:?}");
        let ParamValue::Float(x) = best.parameters["x"] else {
            panic!("x should be a float");
        };
        assert!((x - 1.0).abs() < 0.1, "{strategy:?}: x = {x}");
    }
}

#[test]
fn invalid_arguments_are_rejected() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .max_evaluations(50)
        .build();
    assert!(matches!(
        optimizer.optimize(&converter, &peaked_score, 0, None, None),
        Err(Error::InvalidConfiguration(_))
    ));

    let zero_batch = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(0)
        .build();
    assert!(matches!(
        zero_batch.optimize(&converter, &peaked_score, 1, None, None),
        Err(Error::InvalidConfiguration(_))
    ));

    let short =
        |xs: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> { Ok(DVector::zeros(xs.nrows() - 1)) };
    assert!(matches!(
        optimizer.optimize(&converter, &short, 1, None, None),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn score_errors_propagate() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .max_evaluations(50)
        .build();
    let failing = |_: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> {
        Err(Error::InvalidConfiguration("score failed".into()))
    };
    assert!(optimizer.optimize(&converter, &failing, 1, None, None).is_err());
}
