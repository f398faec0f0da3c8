//! Zero-mean Gaussian-process regression with a Matérn 5/2 kernel.
//!
//! The kernel uses per-dimension squared length scales (ARD):
//!
//! ```text
//! r²      = Σ (x_i - y_i)² / l²_i
//! k(x, y) = σ² (1 + √5 r + 5/3 r²) exp(-√5 r)
//! ```
//!
//! [`GaussianProcessWithCategorical`] adds `Σ [x_k ≠ y_k] / l²_k` over the
//! categorical columns to `r²`.
//!
//! Parameters, their bounds and regularizers:
//!
//! | Name | Bounds | Regularizer |
//! |------|--------|-------------|
//! | `signal_variance` | `[1e-3, 10]` | `0.01 ln(x / 0.039)²` |
//! | `length_scale_squared` | `[1e-2, 1e2]` per dim | `Σ 0.01 ln(x / 0.5)²` |
//! | `observation_noise_variance` | `[1e-10, 1]` | `0.01 ln(x / 0.0039)²` |
//!
//! Rows flagged as missing, and rows whose label is not finite, are left out
//! of the conditioning set.

use core::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use super::SurrogateModel;
use super::params::{ModelParameter, ModelParameterBuilder, ParameterValues};
use crate::distribution::{Distribution, MultivariateNormal};
use crate::error::{Error, Result};
use crate::features::ContinuousAndCategorical;
use crate::linalg;

/// Name of the kernel amplitude parameter.
pub const SIGNAL_VARIANCE: &str = "signal_variance";
/// Name of the per-dimension squared length scales.
pub const LENGTH_SCALE_SQUARED: &str = "length_scale_squared";
/// Name of the squared length scales of categorical columns.
pub const CATEGORICAL_LENGTH_SCALE_SQUARED: &str = "categorical_length_scale_squared";
/// Name of the observation noise parameter.
pub const OBSERVATION_NOISE_VARIANCE: &str = "observation_noise_variance";

const SQRT_5: f64 = 2.236_067_977_499_79;

fn signal_variance_regularizer(v: &DVector<f64>) -> f64 {
    v.iter().map(|x| 0.01 * (x / 0.039).ln().powi(2)).sum()
}

fn length_scale_regularizer(v: &DVector<f64>) -> f64 {
    v.iter().map(|x| 0.01 * (x / 0.5).ln().powi(2)).sum()
}

fn noise_regularizer(v: &DVector<f64>) -> f64 {
    v.iter().map(|x| 0.01 * (x / 0.0039).ln().powi(2)).sum()
}

fn matern52(r_sq: f64, signal_variance: f64) -> f64 {
    let r = r_sq.sqrt();
    let sqrt5_r = SQRT_5 * r;
    signal_variance * (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

/// Kernel hyperparameters read from a [`ParameterValues`] map.
struct Hyper<'a> {
    signal_variance: f64,
    noise_variance: f64,
    length_scale_squared: &'a DVector<f64>,
}

impl<'a> Hyper<'a> {
    fn read(params: &'a ParameterValues, feature_dim: usize) -> Result<Self> {
        let length_scale_squared = params.get(LENGTH_SCALE_SQUARED)?;
        if length_scale_squared.len() != feature_dim {
            return Err(Error::DimensionMismatch {
                what: "length scales",
                expected: feature_dim,
                got: length_scale_squared.len(),
            });
        }
        Ok(Self {
            signal_variance: params.scalar(SIGNAL_VARIANCE)?,
            noise_variance: params.scalar(OBSERVATION_NOISE_VARIANCE)?,
            length_scale_squared,
        })
    }
}

/// Indices of rows that take part in conditioning.
fn observed_rows(labels: &DVector<f64>, observations_is_missing: Option<&[bool]>) -> Result<Vec<usize>> {
    if let Some(mask) = observations_is_missing
        && mask.len() != labels.len()
    {
        return Err(Error::DimensionMismatch {
            what: "observation mask",
            expected: labels.len(),
            got: mask.len(),
        });
    }
    Ok((0..labels.len())
        .filter(|&i| {
            labels[i].is_finite() && !observations_is_missing.is_some_and(|mask| mask[i])
        })
        .collect())
}

/// Posterior predictive at `m` query points given `n` training points.
///
/// `k` is the covariance function over the index space
/// `0..m` (queries) followed by `m..m+n` (training rows).
fn conditioned(
    m: usize,
    observed: &[usize],
    labels: &DVector<f64>,
    noise_variance: f64,
    k: impl Fn(usize, usize) -> f64,
) -> Result<MultivariateNormal> {
    let n = observed.len();
    let k_xx = DMatrix::from_fn(m, m, |i, j| {
        let v = k(i, j);
        if i == j { v + noise_variance } else { v }
    });
    if n == 0 {
        return MultivariateNormal::new(DVector::zeros(m), k_xx);
    }

    let k_ss = DMatrix::from_fn(n, n, |i, j| {
        let v = k(m + observed[i], m + observed[j]);
        if i == j { v + noise_variance } else { v }
    });
    let k_xs = DMatrix::from_fn(m, n, |i, j| k(i, m + observed[j]));
    let targets = DVector::from_fn(n, |i, _| labels[observed[i]]);

    let chol = linalg::retrying_cholesky(&k_ss)?;
    let alpha = chol.solve(&targets);
    let mean = &k_xs * alpha;
    let solved = chol.solve(&k_xs.transpose());
    let mut cov = k_xx - &k_xs * solved;
    // Restore exact symmetry lost to round-off.
    for i in 0..m {
        for j in (i + 1)..m {
            let avg = 0.5 * (cov[(i, j)] + cov[(j, i)]);
            cov[(i, j)] = avg;
            cov[(j, i)] = avg;
        }
    }
    MultivariateNormal::new(mean, cov)
}

/// Negative log marginal likelihood of the observed labels.
#[allow(clippy::cast_precision_loss)]
fn negative_log_likelihood(
    observed: &[usize],
    labels: &DVector<f64>,
    noise_variance: f64,
    k: impl Fn(usize, usize) -> f64,
) -> Result<f64> {
    let n = observed.len();
    if n == 0 {
        return Ok(0.0);
    }
    let k_ss = DMatrix::from_fn(n, n, |i, j| {
        let v = k(observed[i], observed[j]);
        if i == j { v + noise_variance } else { v }
    });
    let targets = DVector::from_fn(n, |i, _| labels[observed[i]]);
    let chol = linalg::retrying_cholesky(&k_ss)?;
    let alpha = chol.solve(&targets);
    Ok(0.5 * targets.dot(&alpha) + 0.5 * linalg::log_det(&chol) + 0.5 * n as f64 * (2.0 * PI).ln())
}

/// Resolves a joint index into (query or training array, row).
fn split_index<'a, T>(xs: &'a T, features: &'a T, index: usize, num_queries: usize) -> (&'a T, usize) {
    if index < num_queries {
        (xs, index)
    } else {
        (features, index - num_queries)
    }
}

fn check_columns(what: &'static str, expected: usize, got: usize) -> Result<()> {
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

fn check_rows(features: usize, labels: usize) -> Result<()> {
    check_columns("label count", features, labels)
}

/// GP over flat feature arrays.
#[derive(Clone, Debug)]
pub struct GaussianProcess {
    feature_dim: usize,
    dimension_is_missing: Option<Vec<bool>>,
}

impl GaussianProcess {
    /// A GP over `feature_dim` columns.
    #[must_use]
    pub fn new(feature_dim: usize) -> Self {
        Self {
            feature_dim,
            dimension_is_missing: None,
        }
    }

    /// Ignores the flagged (padded) columns.
    #[must_use]
    pub fn with_dimension_is_missing(mut self, mask: Vec<bool>) -> Self {
        self.dimension_is_missing = Some(mask);
        self
    }

    /// Number of feature columns.
    #[must_use]
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Parameter declarations of this model.
    #[must_use]
    pub fn parameters(&self) -> ModelParameterBuilder {
        ModelParameterBuilder::new()
            .parameter(
                ModelParameter::bounded(SIGNAL_VARIANCE, 1e-3, 10.0, 1)
                    .with_regularizer(signal_variance_regularizer),
            )
            .parameter(
                ModelParameter::bounded(LENGTH_SCALE_SQUARED, 1e-2, 1e2, self.feature_dim)
                    .with_regularizer(length_scale_regularizer),
            )
            .parameter(
                ModelParameter::bounded(OBSERVATION_NOISE_VARIANCE, 1e-10, 1.0, 1)
                    .with_regularizer(noise_regularizer),
            )
    }

    /// Negative log marginal likelihood plus regularization.
    ///
    /// # Errors
    ///
    /// Returns shape errors, missing parameters, or
    /// [`Error::NumericalFailure`] if the kernel matrix cannot be factorized.
    pub fn loss(
        &self,
        params: &ParameterValues,
        features: &DMatrix<f64>,
        labels: &DVector<f64>,
        observations_is_missing: Option<&[bool]>,
    ) -> Result<f64> {
        let hyper = Hyper::read(params, self.feature_dim)?;
        check_columns("feature columns", self.feature_dim, features.ncols())?;
        self.check_mask()?;
        check_rows(features.nrows(), labels.len())?;
        let observed = observed_rows(labels, observations_is_missing)?;
        let nll = negative_log_likelihood(&observed, labels, hyper.noise_variance, |i, j| {
            self.kernel(&hyper, features, i, features, j)
        })?;
        Ok(nll + self.parameters().regularization(params)?)
    }

    fn check_mask(&self) -> Result<()> {
        match &self.dimension_is_missing {
            Some(mask) => check_columns("dimension mask", self.feature_dim, mask.len()),
            None => Ok(()),
        }
    }

    fn kernel(
        &self,
        hyper: &Hyper<'_>,
        a: &DMatrix<f64>,
        i: usize,
        b: &DMatrix<f64>,
        j: usize,
    ) -> f64 {
        let mut r_sq = 0.0;
        for dim in 0..self.feature_dim {
            if self.dimension_is_missing.as_ref().is_some_and(|mask| mask[dim]) {
                continue;
            }
            let diff = a[(i, dim)] - b[(j, dim)];
            r_sq += diff * diff / hyper.length_scale_squared[dim];
        }
        matern52(r_sq, hyper.signal_variance)
    }
}

impl SurrogateModel<DMatrix<f64>> for GaussianProcess {
    type Params = ParameterValues;

    fn posterior_predictive(
        &self,
        params: &ParameterValues,
        xs: &DMatrix<f64>,
        features: &DMatrix<f64>,
        labels: &DVector<f64>,
        observations_is_missing: Option<&[bool]>,
    ) -> Result<Box<dyn Distribution>> {
        let hyper = Hyper::read(params, self.feature_dim)?;
        check_columns("query columns", self.feature_dim, xs.ncols())?;
        check_columns("feature columns", self.feature_dim, features.ncols())?;
        self.check_mask()?;
        check_rows(features.nrows(), labels.len())?;
        let observed = observed_rows(labels, observations_is_missing)?;
        let num_queries = xs.nrows();
        let dist = conditioned(num_queries, &observed, labels, hyper.noise_variance, |i, j| {
            let (a, ia) = split_index(xs, features, i, num_queries);
            let (b, jb) = split_index(xs, features, j, num_queries);
            self.kernel(&hyper, a, ia, b, jb)
        })?;
        Ok(Box::new(dist))
    }
}

/// GP over [`ContinuousAndCategorical`] features.
#[derive(Clone, Debug)]
pub struct GaussianProcessWithCategorical {
    continuous_dim: usize,
    categorical_dim: usize,
}

impl GaussianProcessWithCategorical {
    /// A GP over `continuous_dim` continuous and `categorical_dim`
    /// categorical columns.
    #[must_use]
    pub fn new(continuous_dim: usize, categorical_dim: usize) -> Self {
        Self {
            continuous_dim,
            categorical_dim,
        }
    }

    /// Parameter declarations of this model.
    #[must_use]
    pub fn parameters(&self) -> ModelParameterBuilder {
        ModelParameterBuilder::new()
            .parameter(
                ModelParameter::bounded(SIGNAL_VARIANCE, 1e-3, 10.0, 1)
                    .with_regularizer(signal_variance_regularizer),
            )
            .parameter(
                ModelParameter::bounded(LENGTH_SCALE_SQUARED, 1e-2, 1e2, self.continuous_dim)
                    .with_regularizer(length_scale_regularizer),
            )
            .parameter(
                ModelParameter::bounded(
                    CATEGORICAL_LENGTH_SCALE_SQUARED,
                    1e-2,
                    1e2,
                    self.categorical_dim,
                )
                .with_regularizer(length_scale_regularizer),
            )
            .parameter(
                ModelParameter::bounded(OBSERVATION_NOISE_VARIANCE, 1e-10, 1.0, 1)
                    .with_regularizer(noise_regularizer),
            )
    }

    /// Negative log marginal likelihood plus regularization.
    ///
    /// # Errors
    ///
    /// See [`GaussianProcess::loss`].
    pub fn loss(
        &self,
        params: &ParameterValues,
        features: &ContinuousAndCategorical,
        labels: &DVector<f64>,
        observations_is_missing: Option<&[bool]>,
    ) -> Result<f64> {
        let hyper = Hyper::read(params, self.continuous_dim)?;
        let categorical_scales = self.categorical_scales(params)?;
        self.check_features(features)?;
        check_rows(features.continuous.nrows(), labels.len())?;
        let observed = observed_rows(labels, observations_is_missing)?;
        let nll = negative_log_likelihood(&observed, labels, hyper.noise_variance, |i, j| {
            Self::kernel(&hyper, categorical_scales, features, i, features, j)
        })?;
        Ok(nll + self.parameters().regularization(params)?)
    }

    fn categorical_scales<'a>(&self, params: &'a ParameterValues) -> Result<&'a DVector<f64>> {
        let scales = params.get(CATEGORICAL_LENGTH_SCALE_SQUARED)?;
        check_columns("categorical length scales", self.categorical_dim, scales.len())?;
        Ok(scales)
    }

    fn check_features(&self, f: &ContinuousAndCategorical) -> Result<()> {
        check_columns("continuous columns", self.continuous_dim, f.continuous.ncols())?;
        check_columns("categorical columns", self.categorical_dim, f.categorical.ncols())
    }

    fn kernel(
        hyper: &Hyper<'_>,
        categorical_scales: &DVector<f64>,
        a: &ContinuousAndCategorical,
        i: usize,
        b: &ContinuousAndCategorical,
        j: usize,
    ) -> f64 {
        let mut r_sq = 0.0;
        for dim in 0..a.continuous.ncols() {
            let diff = a.continuous[(i, dim)] - b.continuous[(j, dim)];
            r_sq += diff * diff / hyper.length_scale_squared[dim];
        }
        for dim in 0..a.categorical.ncols() {
            if a.categorical[(i, dim)] != b.categorical[(j, dim)] {
                r_sq += 1.0 / categorical_scales[dim];
            }
        }
        matern52(r_sq, hyper.signal_variance)
    }
}

impl SurrogateModel<ContinuousAndCategorical> for GaussianProcessWithCategorical {
    type Params = ParameterValues;

    fn posterior_predictive(
        &self,
        params: &ParameterValues,
        xs: &ContinuousAndCategorical,
        features: &ContinuousAndCategorical,
        labels: &DVector<f64>,
        observations_is_missing: Option<&[bool]>,
    ) -> Result<Box<dyn Distribution>> {
        let hyper = Hyper::read(params, self.continuous_dim)?;
        let categorical_scales = self.categorical_scales(params)?;
        self.check_features(xs)?;
        self.check_features(features)?;
        check_rows(features.continuous.nrows(), labels.len())?;
        let observed = observed_rows(labels, observations_is_missing)?;
        let num_queries = xs.continuous.nrows();
        let dist = conditioned(num_queries, &observed, labels, hyper.noise_variance, |i, j| {
            let (a, ia) = split_index(xs, features, i, num_queries);
            let (b, jb) = split_index(xs, features, j, num_queries);
            Self::kernel(&hyper, categorical_scales, a, ia, b, jb)
        })?;
        Ok(Box::new(dist))
    }
}
