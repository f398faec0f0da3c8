//! Acquisition functions.
//!
//! An acquisition function turns the surrogate's predictive distribution at
//! `M` candidate points into `M` scores; higher is better. All variants are
//! configured at construction and are pure afterwards.
//!
//! | Variant | Score |
//! |---------|-------|
//! | [`Ucb`] | `mean + c * stddev` |
//! | [`HyperVolumeScalarization`] | `min(mean, c * stddev)` |
//! | [`Ei`] | Gaussian expected improvement over the best label |
//! | [`Pi`] | Gaussian probability of improvement over the best label |
//! | [`Qei`] | Monte-Carlo expected improvement |
//! | [`Qucb`] | Monte-Carlo upper confidence bound |
//!
//! The Monte-Carlo variants treat each point as a batch of size one and
//! draw `num_samples` samples from the distribution. Without an explicit
//! seed they use seed 0, so repeated calls are reproducible.
//!
//! # Examples
//!
//! ```
//! use acqopt::acquisition::{AcquisitionFunction, Ucb};
//! use acqopt::distribution::{Distribution, Normal};
//! use nalgebra::DVector;
//!
//! let dist = Normal::new(DVector::from_vec(vec![0.0, 1.0]), DVector::from_vec(vec![1.0, 0.5]))
//!     .unwrap();
//! let scores = Ucb::new(2.0).evaluate(&dist, None, None).unwrap();
//! assert_eq!(scores[0], 2.0);
//! assert_eq!(scores[1], 2.0);
//! ```

use nalgebra::{DMatrix, DVector};

use crate::distribution::{Distribution, norm_cdf, norm_pdf};
use crate::error::{Error, Result};
use crate::features::Features;

/// Default exploration coefficient of [`Ucb`] and [`Qucb`].
pub const DEFAULT_UCB_COEFFICIENT: f64 = 1.8;
/// Default number of Monte-Carlo samples of [`Qei`] and [`Qucb`].
pub const DEFAULT_NUM_SAMPLES: usize = 100;
/// Seed used by [`Qei`] and [`Qucb`] when none is configured.
pub const DEFAULT_SEED: u64 = 0;

/// Scores a predictive distribution.
pub trait AcquisitionFunction: Send + Sync {
    /// Returns one score per point of `dist`.
    ///
    /// `features` are the observed points and `labels` their observed
    /// values; variants that do not need them ignore them.
    ///
    /// # Errors
    ///
    /// Improvement-based variants return [`Error::MissingLabels`] when
    /// `labels` is `None`.
    fn evaluate(
        &self,
        dist: &dyn Distribution,
        features: Option<&dyn Features>,
        labels: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>>;
}

/// Largest finite label; padded labels are NaN and skipped.
fn best_observed(labels: Option<&DVector<f64>>) -> Result<f64> {
    let labels = labels.ok_or(Error::MissingLabels)?;
    Ok(labels
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max))
}

/// Upper confidence bound: `mean + coefficient * stddev`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ucb {
    /// Weight of the standard deviation.
    pub coefficient: f64,
}

impl Ucb {
    /// Creates a UCB with the given coefficient.
    #[must_use]
    pub fn new(coefficient: f64) -> Self {
        Self { coefficient }
    }
}

impl Default for Ucb {
    fn default() -> Self {
        Self::new(DEFAULT_UCB_COEFFICIENT)
    }
}

impl AcquisitionFunction for Ucb {
    fn evaluate(
        &self,
        dist: &dyn Distribution,
        _features: Option<&dyn Features>,
        _labels: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>> {
        Ok(dist.mean() + dist.stddev() * self.coefficient)
    }
}

/// `min(mean, coefficient * stddev)`, a non-convex scalarization of the
/// mean/spread trade-off.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HyperVolumeScalarization {
    /// Weight of the standard deviation.
    pub coefficient: f64,
}

impl HyperVolumeScalarization {
    /// Creates the scalarization with the given coefficient.
    #[must_use]
    pub fn new(coefficient: f64) -> Self {
        Self { coefficient }
    }
}

impl Default for HyperVolumeScalarization {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl AcquisitionFunction for HyperVolumeScalarization {
    fn evaluate(
        &self,
        dist: &dyn Distribution,
        _features: Option<&dyn Features>,
        _labels: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>> {
        let stddev = dist.stddev();
        Ok(dist
            .mean()
            .zip_map(&stddev, |m, s| m.min(self.coefficient * s)))
    }
}

/// Expected improvement over the best observed label.
///
/// `EI = (mean - best) Φ(z) + stddev φ(z)`, `z = (mean - best) / stddev`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Ei;

impl AcquisitionFunction for Ei {
    fn evaluate(
        &self,
        dist: &dyn Distribution,
        _features: Option<&dyn Features>,
        labels: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>> {
        let best = best_observed(labels)?;
        let stddev = dist.stddev();
        Ok(dist.mean().zip_map(&stddev, |mean, std| {
            let improvement = mean - best;
            if std < 1e-12 {
                return improvement.max(0.0);
            }
            let z = improvement / std;
            (improvement * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
        }))
    }
}

/// Probability of improving on the best observed label.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pi;

impl AcquisitionFunction for Pi {
    fn evaluate(
        &self,
        dist: &dyn Distribution,
        _features: Option<&dyn Features>,
        labels: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>> {
        let best = best_observed(labels)?;
        let stddev = dist.stddev();
        Ok(dist.mean().zip_map(&stddev, |mean, std| {
            if std < 1e-12 {
                return if mean > best { 1.0 } else { 0.0 };
            }
            norm_cdf((mean - best) / std)
        }))
    }
}

/// Monte-Carlo expected improvement.
///
/// Averages `max(sample - best, 0)` over `num_samples` draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Qei {
    /// Number of samples drawn per evaluation.
    pub num_samples: usize,
    /// Sampling seed; `None` means [`DEFAULT_SEED`].
    pub seed: Option<u64>,
}

impl Qei {
    /// Creates a builder for configuring a `Qei`.
    #[must_use]
    pub fn builder() -> QeiBuilder {
        QeiBuilder::default()
    }
}

impl Default for Qei {
    fn default() -> Self {
        Self {
            num_samples: DEFAULT_NUM_SAMPLES,
            seed: None,
        }
    }
}

/// Builder for [`Qei`].
#[derive(Clone, Debug, Default)]
pub struct QeiBuilder {
    num_samples: Option<usize>,
    seed: Option<u64>,
}

impl QeiBuilder {
    /// Sets the number of Monte-Carlo samples. Default: 100.
    #[must_use]
    pub fn num_samples(mut self, n: usize) -> Self {
        self.num_samples = Some(n);
        self
    }

    /// Sets the sampling seed. Default: 0.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the configured [`Qei`].
    #[must_use]
    pub fn build(self) -> Qei {
        Qei {
            num_samples: self.num_samples.unwrap_or(DEFAULT_NUM_SAMPLES),
            seed: self.seed,
        }
    }
}

impl AcquisitionFunction for Qei {
    #[allow(clippy::cast_precision_loss)]
    fn evaluate(
        &self,
        dist: &dyn Distribution,
        _features: Option<&dyn Features>,
        labels: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>> {
        let best = best_observed(labels)?;
        let samples = dist.sample(self.num_samples, self.seed.unwrap_or(DEFAULT_SEED));
        let n = self.num_samples.max(1) as f64;
        Ok(DVector::from_fn(dist.num_points(), |i, _| {
            samples.column(i).iter().map(|s| (s - best).max(0.0)).sum::<f64>() / n
        }))
    }
}

/// Monte-Carlo upper confidence bound.
///
/// Averages `mean + coefficient * |sample - mean|` over `num_samples`
/// draws. For a Gaussian, `Qucb` with coefficient `c * sqrt(pi / 2)` matches
/// `Ucb` with coefficient `c`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Qucb {
    /// Exploration coefficient.
    pub coefficient: f64,
    /// Number of samples drawn per evaluation.
    pub num_samples: usize,
    /// Sampling seed; `None` means [`DEFAULT_SEED`].
    pub seed: Option<u64>,
}

impl Qucb {
    /// Creates a builder for configuring a `Qucb`.
    #[must_use]
    pub fn builder() -> QucbBuilder {
        QucbBuilder::default()
    }
}

impl Default for Qucb {
    fn default() -> Self {
        Self {
            coefficient: DEFAULT_UCB_COEFFICIENT,
            num_samples: DEFAULT_NUM_SAMPLES,
            seed: None,
        }
    }
}

/// Builder for [`Qucb`].
#[derive(Clone, Debug, Default)]
pub struct QucbBuilder {
    coefficient: Option<f64>,
    num_samples: Option<usize>,
    seed: Option<u64>,
}

impl QucbBuilder {
    /// Sets the exploration coefficient. Default: 1.8.
    #[must_use]
    pub fn coefficient(mut self, c: f64) -> Self {
        self.coefficient = Some(c);
        self
    }

    /// Sets the number of Monte-Carlo samples. Default: 100.
    #[must_use]
    pub fn num_samples(mut self, n: usize) -> Self {
        self.num_samples = Some(n);
        self
    }

    /// Sets the sampling seed. Default: 0.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the configured [`Qucb`].
    #[must_use]
    pub fn build(self) -> Qucb {
        Qucb {
            coefficient: self.coefficient.unwrap_or(DEFAULT_UCB_COEFFICIENT),
            num_samples: self.num_samples.unwrap_or(DEFAULT_NUM_SAMPLES),
            seed: self.seed,
        }
    }
}

impl AcquisitionFunction for Qucb {
    #[allow(clippy::cast_precision_loss)]
    fn evaluate(
        &self,
        dist: &dyn Distribution,
        _features: Option<&dyn Features>,
        _labels: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>> {
        let mean = dist.mean();
        let samples = dist.sample(self.num_samples, self.seed.unwrap_or(DEFAULT_SEED));
        let n = self.num_samples.max(1) as f64;
        Ok(DVector::from_fn(dist.num_points(), |i, _| {
            samples
                .column(i)
                .iter()
                .map(|s| mean[i] + self.coefficient * (s - mean[i]).abs())
                .sum::<f64>()
                / n
        }))
    }
}

/// Named acquisition functions evaluated against one distribution.
///
/// Each name becomes one row of the output and one maximized metric of the
/// acquisition problem.
#[derive(Default)]
pub struct MultiAcquisition {
    functions: Vec<(String, Box<dyn AcquisitionFunction>)>,
}

impl MultiAcquisition {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a named function; order is preserved.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, function: impl AcquisitionFunction + 'static) -> Self {
        self.functions.push((name.into(), Box::new(function)));
        self
    }

    /// Names in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|(name, _)| name.as_str())
    }

    /// Number of functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns `true` if no function was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Evaluates every function, stacking the scores into a
    /// `(num_functions, num_points)` matrix.
    ///
    /// # Errors
    ///
    /// Propagates the first error of any member.
    pub fn evaluate(
        &self,
        dist: &dyn Distribution,
        features: Option<&dyn Features>,
        labels: Option<&DVector<f64>>,
    ) -> Result<DMatrix<f64>> {
        let mut out = DMatrix::zeros(self.functions.len(), dist.num_points());
        for (row, (_, function)) in self.functions.iter().enumerate() {
            let scores = function.evaluate(dist, features, labels)?;
            out.row_mut(row).copy_from(&scores.transpose());
        }
        Ok(out)
    }
}

impl core::fmt::Debug for MultiAcquisition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MultiAcquisition")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
