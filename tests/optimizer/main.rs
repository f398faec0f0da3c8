mod best_results;
mod determinism;
mod padding;
mod prior_trials;

use acqopt::prelude::*;
use nalgebra::{DMatrix, DVector};

/// `x` in [-2, 2], `c` in {a, b, c}.
fn mixed_problem() -> ProblemStatement {
    ProblemStatement::new(
        SearchSpace::new()
            .add_float("x", -2.0, 2.0)
            .add_categorical("c", ["a", "b", "c"]),
    )
}

/// Peaks at feature `x = 0.75` (parameter `x = 1.0`) with category `b`.
#[allow(clippy::unnecessary_wraps)]
fn peaked_score(xs: &DMatrix<f64>) -> acqopt::Result<DVector<f64>> {
    Ok(DVector::from_fn(xs.nrows(), |i, _| {
        -(xs[(i, 0)] - 0.75).powi(2) + xs[(i, 2)]
    }))
}

fn acquisition(trial: &Trial) -> f64 {
    trial.metric("acquisition").unwrap()
}
