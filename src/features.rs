//! Feature representations accepted by the surrogate, trust region and
//! acquisition builders.
//!
//! Two forms exist: a flat `DMatrix<f64>` whose columns are the encoded
//! search-space dimensions, and [`ContinuousAndCategorical`], which keeps
//! integer-coded categorical columns apart from the continuous ones.

use std::sync::Arc;

use nalgebra::DMatrix;

use crate::converter::ArraySpec;
use crate::error::{Error, Result};
use crate::trust_region::{TrustRegion, TrustRegionEstimator, TrustRegionWithCategorical};

/// Which of the two feature forms a value uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureRepresentation {
    /// A single flat `[0, 1]` array.
    Array,
    /// Continuous columns plus integer-coded categorical columns.
    ContinuousAndCategorical,
}

/// A batch of points in one of the supported feature forms.
pub trait Features: core::fmt::Debug + Send + Sync + 'static {
    /// Number of points (rows).
    fn num_rows(&self) -> usize;

    /// Total number of encoded columns.
    fn num_columns(&self) -> usize;

    /// The form of this value.
    fn representation(&self) -> FeatureRepresentation;

    /// Builds the trust region anchored at these rows.
    ///
    /// `feature_is_missing` and `observations_is_missing` flag padded columns
    /// and rows; representations that do not support padding ignore them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the specs or masks disagree
    /// with the shape of the trusted rows.
    fn trust_region(
        self: Arc<Self>,
        specs: &[ArraySpec],
        feature_is_missing: Option<Vec<bool>>,
        observations_is_missing: Option<Vec<bool>>,
    ) -> Result<Arc<dyn TrustRegionEstimator<Self>>>
    where
        Self: Sized;
}

impl Features for DMatrix<f64> {
    fn num_rows(&self) -> usize {
        self.nrows()
    }

    fn num_columns(&self) -> usize {
        self.ncols()
    }

    fn representation(&self) -> FeatureRepresentation {
        FeatureRepresentation::Array
    }

    fn trust_region(
        self: Arc<Self>,
        specs: &[ArraySpec],
        feature_is_missing: Option<Vec<bool>>,
        observations_is_missing: Option<Vec<bool>>,
    ) -> Result<Arc<dyn TrustRegionEstimator<Self>>> {
        let tr = TrustRegion::with_masks(
            self.as_ref().clone(),
            specs,
            feature_is_missing,
            observations_is_missing,
        )?;
        Ok(Arc::new(tr))
    }
}

/// Continuous features plus integer-coded categorical features for the same
/// rows.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousAndCategorical {
    /// `(M, Dc)` continuous values in `[0, 1]`.
    pub continuous: DMatrix<f64>,
    /// `(M, Dk)` category indices.
    pub categorical: DMatrix<u32>,
}

impl ContinuousAndCategorical {
    /// Pairs the two arrays, checking that they share a row count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the row counts differ.
    pub fn new(continuous: DMatrix<f64>, categorical: DMatrix<u32>) -> Result<Self> {
        if continuous.nrows() != categorical.nrows() {
            return Err(Error::DimensionMismatch {
                what: "categorical rows",
                expected: continuous.nrows(),
                got: categorical.nrows(),
            });
        }
        Ok(Self {
            continuous,
            categorical,
        })
    }
}

impl Features for ContinuousAndCategorical {
    fn num_rows(&self) -> usize {
        self.continuous.nrows()
    }

    fn num_columns(&self) -> usize {
        self.continuous.ncols() + self.categorical.ncols()
    }

    fn representation(&self) -> FeatureRepresentation {
        FeatureRepresentation::ContinuousAndCategorical
    }

    fn trust_region(
        self: Arc<Self>,
        _specs: &[ArraySpec],
        _feature_is_missing: Option<Vec<bool>>,
        _observations_is_missing: Option<Vec<bool>>,
    ) -> Result<Arc<dyn TrustRegionEstimator<Self>>> {
        Ok(Arc::new(TrustRegionWithCategorical::new(
            self.as_ref().clone(),
        )))
    }
}
