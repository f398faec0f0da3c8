//! L-infinity trust regions around trusted (usually observed) points.
//!
//! A trust region is the union of L∞ balls of radius `trust_radius` centred
//! on each trusted point of the unit hypercube. The radius grows with the
//! number of trusted points relative to the dimensionality:
//!
//! ```text
//! trust_level = N / (dimension_factor * (dof + 1))
//! radius      = min_radius + (0.5 - min_radius) * trust_level
//! ```
//!
//! Acquisition builders use [`TrustRegionEstimator::min_linf_distance`] to
//! penalize candidates that fall outside every ball.

use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::converter::{ArraySpec, ArraySpecType};
use crate::error::{Error, Result};
use crate::features::ContinuousAndCategorical;

/// Smallest radius, reached with zero trusted points.
pub const DEFAULT_MIN_RADIUS: f64 = 0.2;
/// Scales how many trusted points per degree of freedom widen the radius.
pub const DEFAULT_DIMENSION_FACTOR: f64 = 5.0;

/// Distance queries against a fixed set of trusted points of form `F`.
pub trait TrustRegionEstimator<F>: core::fmt::Debug + Send + Sync {
    /// The ball radius.
    fn trust_radius(&self) -> f64;

    /// L∞ distance from each row of `xs` to its nearest trusted point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `xs` does not have the
    /// trusted points' column layout.
    fn min_linf_distance(&self, xs: &F) -> Result<DVector<f64>>;
}

#[allow(clippy::cast_precision_loss)]
fn compute_radius(num_trusted: usize, dof: usize, min_radius: f64, dimension_factor: f64) -> f64 {
    let n = num_trusted as f64;
    // Feasible and infeasible points are weighted 0.1 / 0.9; every point
    // currently counts as both.
    let trust_level = (0.1 * n + 0.9 * n) / (dimension_factor * (dof as f64 + 1.0));
    min_radius + (0.5 - min_radius) * trust_level
}

fn check_columns(expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what: "trust region query columns",
            expected,
            got,
        })
    }
}

/// Trust region over flat `[0, 1]` feature arrays.
///
/// Distances along one-hot dimensions are capped at the radius so that the
/// cutoff never discourages switching categories.
#[derive(Clone, Debug)]
pub struct TrustRegion {
    trusted: DMatrix<f64>,
    dof: usize,
    trust_radius: f64,
    feature_is_missing: Option<Vec<bool>>,
    observations_is_missing: Option<Vec<bool>>,
    max_distances: DVector<f64>,
}

impl TrustRegion {
    /// Builds a trust region around the rows of `trusted`.
    ///
    /// `specs` are the converter's output specs; their dimensions must add up
    /// to the number of columns of `trusted`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the specs do not cover the
    /// columns.
    pub fn new(trusted: DMatrix<f64>, specs: &[ArraySpec]) -> Result<Self> {
        Self::with_masks(trusted, specs, None, None)
    }

    /// Like [`TrustRegion::new`], for padded features.
    ///
    /// Columns flagged in `feature_is_missing` are ignored; columns beyond the
    /// specs are treated as padding. Rows flagged in `observations_is_missing`
    /// are never considered close.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if a mask length or the spec
    /// dimensions disagree with `trusted`.
    pub fn with_masks(
        trusted: DMatrix<f64>,
        specs: &[ArraySpec],
        feature_is_missing: Option<Vec<bool>>,
        observations_is_missing: Option<Vec<bool>>,
    ) -> Result<Self> {
        if let Some(mask) = &feature_is_missing
            && mask.len() != trusted.ncols()
        {
            return Err(Error::DimensionMismatch {
                what: "feature mask",
                expected: trusted.ncols(),
                got: mask.len(),
            });
        }

        let dof = specs.len();
        let trust_radius = compute_radius(
            trusted.nrows(),
            dof,
            DEFAULT_MIN_RADIUS,
            DEFAULT_DIMENSION_FACTOR,
        );

        let mut max_distances = Vec::with_capacity(trusted.ncols());
        for spec in specs {
            let cap = match spec.spec_type {
                ArraySpecType::OneHotEmbedding => trust_radius,
                ArraySpecType::Continuous => f64::INFINITY,
            };
            max_distances.extend(core::iter::repeat_n(cap, spec.num_dimensions));
        }
        if let Some(mask) = &feature_is_missing
            && mask.len() > max_distances.len()
        {
            max_distances.resize(mask.len(), 0.0);
        }
        if max_distances.len() != trusted.ncols() {
            return Err(Error::DimensionMismatch {
                what: "trust region spec dimensions",
                expected: trusted.ncols(),
                got: max_distances.len(),
            });
        }
        if let Some(mask) = &observations_is_missing
            && mask.len() != trusted.nrows()
        {
            return Err(Error::DimensionMismatch {
                what: "observation mask",
                expected: trusted.nrows(),
                got: mask.len(),
            });
        }

        trace_debug!(
            trust_radius,
            dof,
            num_trusted = trusted.nrows(),
            "trust region built"
        );

        Ok(Self {
            trusted,
            dof,
            trust_radius,
            feature_is_missing,
            observations_is_missing,
            max_distances: DVector::from_vec(max_distances),
        })
    }

    /// Number of degrees of freedom (converter output specs).
    #[must_use]
    pub fn dof(&self) -> usize {
        self.dof
    }

    /// The trusted points.
    #[must_use]
    pub fn trusted(&self) -> &DMatrix<f64> {
        &self.trusted
    }

    fn is_feature_missing(&self, col: usize) -> bool {
        self.feature_is_missing
            .as_ref()
            .is_some_and(|mask| mask[col])
    }

    fn is_observation_missing(&self, row: usize) -> bool {
        self.observations_is_missing
            .as_ref()
            .is_some_and(|mask| mask[row])
    }
}

impl TrustRegionEstimator<DMatrix<f64>> for TrustRegion {
    fn trust_radius(&self) -> f64 {
        self.trust_radius
    }

    fn min_linf_distance(&self, xs: &DMatrix<f64>) -> Result<DVector<f64>> {
        let d = self.trusted.ncols();
        check_columns(d, xs.ncols())?;

        Ok(DVector::from_fn(xs.nrows(), |i, _| {
            (0..self.trusted.nrows())
                .map(|j| {
                    let missing_row = self.is_observation_missing(j);
                    (0..d)
                        .map(|k| {
                            let raw = if missing_row {
                                f64::INFINITY
                            } else if self.is_feature_missing(k) {
                                0.0
                            } else {
                                (self.trusted[(j, k)] - xs[(i, k)]).abs()
                            };
                            raw.min(self.max_distances[k])
                        })
                        .fold(0.0, f64::max)
                })
                .fold(f64::INFINITY, f64::min)
        }))
    }
}

/// Trust region over [`ContinuousAndCategorical`] features.
///
/// The radius counts both parts as degrees of freedom; distances only use
/// the continuous part.
#[derive(Clone, Debug)]
pub struct TrustRegionWithCategorical {
    trusted: ContinuousAndCategorical,
    min_radius: f64,
    dimension_factor: f64,
    dof: usize,
    trust_radius: f64,
}

impl TrustRegionWithCategorical {
    /// Builds a trust region with the default `min_radius` (0.2) and
    /// `dimension_factor` (5.0).
    #[must_use]
    pub fn new(trusted: ContinuousAndCategorical) -> Self {
        Self::with_params(trusted, DEFAULT_MIN_RADIUS, DEFAULT_DIMENSION_FACTOR)
    }

    /// Builds a trust region with explicit radius hyperparameters.
    #[must_use]
    pub fn with_params(
        trusted: ContinuousAndCategorical,
        min_radius: f64,
        dimension_factor: f64,
    ) -> Self {
        let dof = trusted.continuous.ncols() + trusted.categorical.ncols();
        let trust_radius = compute_radius(
            trusted.continuous.nrows(),
            dof,
            min_radius,
            dimension_factor,
        );
        trace_debug!(
            trust_radius,
            dof,
            num_trusted = trusted.continuous.nrows(),
            "categorical trust region built"
        );
        Self {
            trusted,
            min_radius,
            dimension_factor,
            dof,
            trust_radius,
        }
    }

    /// Radius with zero trusted points.
    #[must_use]
    pub fn min_radius(&self) -> f64 {
        self.min_radius
    }

    /// Trusted points per degree of freedom needed to widen the radius.
    #[must_use]
    pub fn dimension_factor(&self) -> f64 {
        self.dimension_factor
    }

    /// Number of degrees of freedom (continuous + categorical columns).
    #[must_use]
    pub fn dof(&self) -> usize {
        self.dof
    }
}

impl TrustRegionEstimator<ContinuousAndCategorical> for TrustRegionWithCategorical {
    fn trust_radius(&self) -> f64 {
        self.trust_radius
    }

    fn min_linf_distance(&self, xs: &ContinuousAndCategorical) -> Result<DVector<f64>> {
        let trusted = &self.trusted.continuous;
        let query = &xs.continuous;
        check_columns(trusted.ncols(), query.ncols())?;

        Ok(DVector::from_fn(query.nrows(), |i, _| {
            (0..trusted.nrows())
                .map(|j| {
                    (0..trusted.ncols())
                        .map(|k| (trusted[(j, k)] - query[(i, k)]).abs())
                        .fold(0.0, f64::max)
                })
                .fold(f64::INFINITY, f64::min)
        }))
    }
}
