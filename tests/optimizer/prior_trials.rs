use std::time::{Duration, SystemTime};

use acqopt::optimizer::{DifferentialEvolutionFactory, VectorizedOptimizer};
use acqopt::prelude::*;
use nalgebra::{DMatrix, DVector};

use crate::{acquisition, mixed_problem, peaked_score};

fn trial(x: f64, c: usize, age_secs: u64) -> Trial {
    Trial::new(ParameterDict::new())
        .with_param("x", ParamValue::Float(x))
        .with_param("c", ParamValue::Categorical(c))
        .with_creation_time(SystemTime::UNIX_EPOCH + Duration::from_secs(age_secs))
}

#[test]
fn priors_are_scored_but_not_returned() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(DifferentialEvolutionFactory::default())
        .suggestion_batch_size(4)
        .max_evaluations(8)
        .build();
    let priors = [trial(-2.0, 0, 1), trial(1.0, 1, 2), trial(0.0, 2, 3)];

    let scored = std::sync::Mutex::new(0);
    let score = |xs: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> {
        *scored.lock().unwrap() += xs.nrows();
        peaked_score(xs)
    };
    let (trials, summary) = optimizer
        .optimize_with_summary(&converter, &score, 2, Some(&priors[..]), Some(0))
        .unwrap();

    assert_eq!(scored.into_inner().unwrap(), 3 + 8);
    assert_eq!(summary.evaluations, 8);
    assert_eq!(trials.len(), 2);
    assert!(trials.iter().all(|t| acquisition(t) <= 1.0));
}

#[test]
fn priors_are_scored_in_creation_order() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(2)
        .max_evaluations(2)
        .build();
    let priors = [trial(2.0, 0, 30), trial(-2.0, 0, 10), trial(0.0, 0, 20)];

    let first_call = std::sync::Mutex::new(None);
    let score = |xs: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> {
        let mut first = first_call.lock().unwrap();
        if first.is_none() {
            *first = Some(xs.column(0).iter().copied().collect::<Vec<_>>());
        }
        peaked_score(xs)
    };
    optimizer
        .optimize(&converter, &score, 1, Some(&priors[..]), None)
        .unwrap();
    assert_eq!(first_call.into_inner().unwrap().unwrap(), vec![0.0, 0.5, 1.0]);
}

#[test]
fn empty_prior_slice_is_ignored() {
    let converter = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(5)
        .max_evaluations(25)
        .build();
    let with_empty = optimizer
        .optimize(&converter, &peaked_score, 2, Some(&[][..]), Some(4))
        .unwrap();
    let without = optimizer
        .optimize(&converter, &peaked_score, 2, None, Some(4))
        .unwrap();
    let params = |ts: &[Trial]| ts.iter().map(|t| t.parameters.clone()).collect::<Vec<_>>();
    assert_eq!(params(&with_empty), params(&without));
}
