//! Dense linear-algebra helpers shared by the surrogate and its predictive
//! distributions.

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, Dyn};

use crate::error::{Error, Result};

/// Jitter added on the first retry; multiplied by 10 on each further retry.
pub(crate) const INITIAL_JITTER: f64 = 1e-4;
/// Total number of factorization attempts, including the jitter-free one.
pub(crate) const MAX_CHOLESKY_ATTEMPTS: usize = 5;

/// Cholesky factorization that retries with growing diagonal jitter.
///
/// The first attempt uses the matrix as given; attempt `k > 0` adds
/// `INITIAL_JITTER * 10^(k-1)` to the diagonal.
pub(crate) fn retrying_cholesky(matrix: &DMatrix<f64>) -> Result<Cholesky<f64, Dyn>> {
    let n = matrix.nrows();
    let mut jitter = 0.0;
    for attempt in 0..MAX_CHOLESKY_ATTEMPTS {
        let mut m = matrix.clone();
        if jitter > 0.0 {
            for i in 0..n {
                m[(i, i)] += jitter;
            }
        }
        if let Some(chol) = Cholesky::new(m) {
            return Ok(chol);
        }
        jitter = if attempt == 0 {
            INITIAL_JITTER
        } else {
            jitter * 10.0
        };
        trace_debug!(attempt, jitter, "cholesky failed, retrying with jitter");
    }
    Err(Error::NumericalFailure {
        attempts: MAX_CHOLESKY_ATTEMPTS,
    })
}

/// Natural log of the determinant of `L Lᵀ` given its factor.
pub(crate) fn log_det(chol: &Cholesky<f64, Dyn>) -> f64 {
    chol.l_dirty().diagonal().iter().map(|d| 2.0 * d.ln()).sum()
}
