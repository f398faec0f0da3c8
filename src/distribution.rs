//! Predictive distributions over a batch of points.
//!
//! A [`Distribution`] describes the surrogate's belief about the objective
//! at `M` points. Acquisition functions only consume this interface, so any
//! surrogate that can produce a mean, a standard deviation and samples can
//! be plugged in.
//!
//! Three implementations are provided:
//!
//! - [`Normal`]: independent Gaussians, one per point.
//! - [`MixtureSameFamily`]: equal-weight mixture of `K` Gaussians per point,
//!   the collapsed form of an ensemble of surrogates.
//! - [`MultivariateNormal`]: joint Gaussian, as produced by a GP posterior.

use core::f64::consts::PI;

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};

use crate::error::{Error, Result};
use crate::linalg;
use crate::rng_util;

/// A predictive distribution over `M` points.
pub trait Distribution: Send + Sync {
    /// Number of points the distribution is defined over.
    fn num_points(&self) -> usize;

    /// Per-point mean, shape `(M,)`.
    fn mean(&self) -> DVector<f64>;

    /// Per-point standard deviation, shape `(M,)`.
    fn stddev(&self) -> DVector<f64>;

    /// Draws `num_samples` joint samples, shape `(num_samples, M)`.
    ///
    /// The same `seed` always yields the same samples.
    fn sample(&self, num_samples: usize, seed: u64) -> DMatrix<f64>;

    /// Log density of `values`, treating the `M` points as one event.
    ///
    /// Entries flagged in `is_missing` are excluded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `values` or `is_missing` do
    /// not have `M` entries.
    fn log_prob(&self, values: &DVector<f64>, is_missing: Option<&[bool]>) -> Result<f64>;
}

/// Standard normal PDF.
pub(crate) fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF (Abramowitz-Stegun rational approximation).
pub(crate) fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let abs_x = x.abs();
    let t = 1.0 / (1.0 + 0.231_641_9 * abs_x);
    let t2 = t * t;
    let t3 = t2 * t;
    let t4 = t3 * t;
    let t5 = t4 * t;

    let poly = 0.319_381_530 * t - 0.356_563_782 * t2 + 1.781_477_937 * t3 - 1.821_255_978 * t4
        + 1.330_274_429 * t5;
    let pdf = norm_pdf(abs_x);
    let cdf = 1.0 - pdf * poly;

    if x >= 0.0 { cdf } else { 1.0 - cdf }
}

fn normal_log_pdf(x: f64, loc: f64, scale: f64) -> f64 {
    let z = (x - loc) / scale;
    -0.5 * z * z - scale.ln() - 0.5 * (2.0 * PI).ln()
}

fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what,
            expected,
            got,
        })
    }
}

fn observed_mask(is_missing: Option<&[bool]>, n: usize) -> Result<Vec<bool>> {
    match is_missing {
        Some(mask) => {
            check_len("missing-value mask", n, mask.len())?;
            Ok(mask.iter().map(|m| !m).collect())
        }
        None => Ok(vec![true; n]),
    }
}

// ---------------------------------------------------------------------------
// Normal
// ---------------------------------------------------------------------------

/// Independent Gaussians, one per point.
#[derive(Clone, Debug, PartialEq)]
pub struct Normal {
    loc: DVector<f64>,
    scale: DVector<f64>,
}

impl Normal {
    /// Creates a batch of independent normals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `loc` and `scale` differ in
    /// length.
    pub fn new(loc: DVector<f64>, scale: DVector<f64>) -> Result<Self> {
        check_len("normal scale", loc.len(), scale.len())?;
        Ok(Self { loc, scale })
    }
}

impl Distribution for Normal {
    fn num_points(&self) -> usize {
        self.loc.len()
    }

    fn mean(&self) -> DVector<f64> {
        self.loc.clone()
    }

    fn stddev(&self) -> DVector<f64> {
        self.scale.clone()
    }

    fn sample(&self, num_samples: usize, seed: u64) -> DMatrix<f64> {
        let mut rng = rng_util::normal_rng(seed);
        let m = self.loc.len();
        let mut out = DMatrix::zeros(num_samples, m);
        for s in 0..num_samples {
            for i in 0..m {
                out[(s, i)] = self.loc[i] + self.scale[i] * rng_util::sample_standard_normal(&mut rng);
            }
        }
        out
    }

    fn log_prob(&self, values: &DVector<f64>, is_missing: Option<&[bool]>) -> Result<f64> {
        check_len("log_prob values", self.loc.len(), values.len())?;
        let observed = observed_mask(is_missing, values.len())?;
        Ok((0..values.len())
            .filter(|&i| observed[i])
            .map(|i| normal_log_pdf(values[i], self.loc[i], self.scale[i]))
            .sum())
    }
}

// ---------------------------------------------------------------------------
// MixtureSameFamily
// ---------------------------------------------------------------------------

/// Equal-weight mixture of `K` Gaussians at each of `M` points.
///
/// Row `i` of `locs`/`scales` holds the `K` component parameters of point
/// `i`. Each point mixes independently.
#[derive(Clone, Debug, PartialEq)]
pub struct MixtureSameFamily {
    locs: DMatrix<f64>,
    scales: DMatrix<f64>,
}

impl MixtureSameFamily {
    /// Creates the mixture from `(M, K)` component means and standard
    /// deviations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the two matrices differ in
    /// shape, and [`Error::EmptyEnsemble`] if `K` is zero.
    pub fn new(locs: DMatrix<f64>, scales: DMatrix<f64>) -> Result<Self> {
        check_len("mixture scale rows", locs.nrows(), scales.nrows())?;
        check_len("mixture scale columns", locs.ncols(), scales.ncols())?;
        if locs.ncols() == 0 {
            return Err(Error::EmptyEnsemble);
        }
        Ok(Self { locs, scales })
    }

    /// Number of mixture components per point.
    #[must_use]
    pub fn num_components(&self) -> usize {
        self.locs.ncols()
    }

    #[allow(clippy::cast_precision_loss)]
    fn weight(&self) -> f64 {
        1.0 / self.locs.ncols() as f64
    }
}

impl Distribution for MixtureSameFamily {
    fn num_points(&self) -> usize {
        self.locs.nrows()
    }

    fn mean(&self) -> DVector<f64> {
        let w = self.weight();
        DVector::from_fn(self.locs.nrows(), |i, _| self.locs.row(i).sum() * w)
    }

    fn stddev(&self) -> DVector<f64> {
        // Var = E[σ² + μ²] − (E[μ])²
        let w = self.weight();
        let mean = self.mean();
        DVector::from_fn(self.locs.nrows(), |i, _| {
            let second_moment: f64 = self
                .locs
                .row(i)
                .iter()
                .zip(self.scales.row(i).iter())
                .map(|(mu, sigma)| sigma * sigma + mu * mu)
                .sum::<f64>()
                * w;
            (second_moment - mean[i] * mean[i]).max(0.0).sqrt()
        })
    }

    fn sample(&self, num_samples: usize, seed: u64) -> DMatrix<f64> {
        let [component_seed, normal_seed] = rng_util::split_seed::<2>(seed);
        let mut component_rng = fastrand::Rng::with_seed(component_seed);
        let mut rng = rng_util::normal_rng(normal_seed);
        let (m, k) = self.locs.shape();
        let mut out = DMatrix::zeros(num_samples, m);
        for s in 0..num_samples {
            for i in 0..m {
                let c = component_rng.usize(0..k);
                out[(s, i)] = self.locs[(i, c)]
                    + self.scales[(i, c)] * rng_util::sample_standard_normal(&mut rng);
            }
        }
        out
    }

    fn log_prob(&self, values: &DVector<f64>, is_missing: Option<&[bool]>) -> Result<f64> {
        check_len("log_prob values", self.locs.nrows(), values.len())?;
        let observed = observed_mask(is_missing, values.len())?;
        let log_w = self.weight().ln();
        let mut total = 0.0;
        for i in (0..values.len()).filter(|&i| observed[i]) {
            let terms: Vec<f64> = (0..self.locs.ncols())
                .map(|c| log_w + normal_log_pdf(values[i], self.locs[(i, c)], self.scales[(i, c)]))
                .collect();
            let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max.is_finite() {
                total += max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln();
            } else {
                total += max;
            }
        }
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// MultivariateNormal
// ---------------------------------------------------------------------------

/// Joint Gaussian over `M` points.
#[derive(Clone, Debug)]
pub struct MultivariateNormal {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    scale_tril: Cholesky<f64, Dyn>,
}

impl MultivariateNormal {
    /// Creates the distribution, factorizing the covariance with jitter
    /// retries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] on shape disagreement and
    /// [`Error::NumericalFailure`] if the covariance cannot be factorized.
    pub fn new(mean: DVector<f64>, covariance: DMatrix<f64>) -> Result<Self> {
        check_len("covariance rows", mean.len(), covariance.nrows())?;
        check_len("covariance columns", mean.len(), covariance.ncols())?;
        let scale_tril = linalg::retrying_cholesky(&covariance)?;
        Ok(Self {
            mean,
            covariance,
            scale_tril,
        })
    }

    /// The full covariance matrix.
    #[must_use]
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }
}

impl Distribution for MultivariateNormal {
    fn num_points(&self) -> usize {
        self.mean.len()
    }

    fn mean(&self) -> DVector<f64> {
        self.mean.clone()
    }

    fn stddev(&self) -> DVector<f64> {
        self.covariance.diagonal().map(|v| v.max(0.0).sqrt())
    }

    fn sample(&self, num_samples: usize, seed: u64) -> DMatrix<f64> {
        let mut rng = rng_util::normal_rng(seed);
        let m = self.mean.len();
        let l = self.scale_tril.l();
        let mut out = DMatrix::zeros(num_samples, m);
        for s in 0..num_samples {
            let z = DVector::from_fn(m, |_, _| rng_util::sample_standard_normal(&mut rng));
            let x = &self.mean + &l * z;
            out.row_mut(s).copy_from(&x.transpose());
        }
        out
    }

    #[allow(clippy::cast_precision_loss)]
    fn log_prob(&self, values: &DVector<f64>, is_missing: Option<&[bool]>) -> Result<f64> {
        check_len("log_prob values", self.mean.len(), values.len())?;
        let observed = observed_mask(is_missing, values.len())?;
        let idx: Vec<usize> = (0..values.len()).filter(|&i| observed[i]).collect();
        if idx.is_empty() {
            return Ok(0.0);
        }

        let chol = if idx.len() == values.len() {
            self.scale_tril.clone()
        } else {
            let sub = DMatrix::from_fn(idx.len(), idx.len(), |a, b| {
                self.covariance[(idx[a], idx[b])]
            });
            linalg::retrying_cholesky(&sub)?
        };

        let diff = DVector::from_fn(idx.len(), |a, _| values[idx[a]] - self.mean[idx[a]]);
        let alpha = chol.solve(&diff);
        let n = idx.len() as f64;
        Ok(-0.5 * diff.dot(&alpha) - 0.5 * linalg::log_det(&chol) - 0.5 * n * (2.0 * PI).ln())
    }
}
