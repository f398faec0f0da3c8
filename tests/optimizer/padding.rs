use acqopt::optimizer::{DifferentialEvolutionFactory, VectorizedOptimizer};
use acqopt::prelude::*;
use nalgebra::{DMatrix, DVector};

use crate::mixed_problem;

fn padded() -> PaddedTrialToArrayConverter {
    let inner = TrialToArrayConverter::from_problem(&mixed_problem()).unwrap();
    PaddedTrialToArrayConverter::new(inner, 8, 4).unwrap()
}

#[test]
fn padded_columns_reach_the_score_as_zero() {
    let converter = padded();
    assert_eq!(converter.num_features(), 8);
    let optimizer = VectorizedOptimizer::builder(DifferentialEvolutionFactory::default())
        .suggestion_batch_size(6)
        .max_evaluations(60)
        .build();

    let score = |xs: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> {
        assert_eq!(xs.ncols(), 8);
        for i in 0..xs.nrows() {
            for j in 4..8 {
                assert_eq!(xs[(i, j)], 0.0);
            }
        }
        Ok(DVector::from_fn(xs.nrows(), |i, _| xs[(i, 0)]))
    };
    let trials = optimizer
        .optimize(&converter, &score, 2, None, Some(2))
        .unwrap();
    assert_eq!(trials.len(), 2);
    assert_eq!(trials[0].parameters.len(), 2);
}

#[test]
fn padded_prior_rows_are_zeroed() {
    let converter = padded();
    let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
        .suggestion_batch_size(3)
        .max_evaluations(3)
        .build();
    let prior = Trial::new(ParameterDict::new())
        .with_param("x", ParamValue::Float(2.0))
        .with_param("c", ParamValue::Categorical(2));

    let first_call = std::sync::Mutex::new(None);
    let score = |xs: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> {
        let mut first = first_call.lock().unwrap();
        if first.is_none() {
            *first = Some(xs.clone());
        }
        Ok(DVector::from_fn(xs.nrows(), |i, _| xs.row(i).sum()))
    };
    optimizer
        .optimize(&converter, &score, 1, Some(core::slice::from_ref(&prior)), None)
        .unwrap();

    let prior_rows = first_call.into_inner().unwrap().unwrap();
    assert_eq!(prior_rows.nrows(), 4);
    assert_eq!(prior_rows.row(0).sum(), 2.0);
    for i in 1..4 {
        assert!(prior_rows.row(i).iter().all(|v| *v == 0.0));
    }
}
