//! Surrogate models.
//!
//! A surrogate maps a parameter set, the observed data and a batch of query
//! points to a predictive [`Distribution`]. The acquisition builders treat
//! the model as a pure function of its parameters: an ensemble is simply a
//! list of parameter sets passed through the same model.
//!
//! Fitting parameters is left to the caller. [`GaussianProcess::parameters`]
//! describes the bounds and regularizers, and [`GaussianProcess::loss`] is
//! the objective to minimize.

mod gp;
mod params;

use nalgebra::DVector;

use crate::distribution::Distribution;
use crate::error::Result;
use crate::features::Features;

pub use gp::{
    CATEGORICAL_LENGTH_SCALE_SQUARED, GaussianProcess, GaussianProcessWithCategorical,
    LENGTH_SCALE_SQUARED, OBSERVATION_NOISE_VARIANCE, SIGNAL_VARIANCE,
};
pub use params::{ModelParameter, ModelParameterBuilder, ParameterValues, Regularizer};

/// A probabilistic model over feature form `F`.
pub trait SurrogateModel<F: Features>: Send + Sync {
    /// One member of a parameter ensemble.
    type Params: Clone + Send + Sync + 'static;

    /// Predictive distribution at `xs` after conditioning on
    /// `(features, labels)`.
    ///
    /// Rows flagged in `observations_is_missing` are padding and must not
    /// influence the result.
    ///
    /// # Errors
    ///
    /// Returns shape errors for mismatched arrays and
    /// [`Error::NumericalFailure`](crate::Error::NumericalFailure) when the
    /// kernel matrix cannot be factorized.
    fn posterior_predictive(
        &self,
        params: &Self::Params,
        xs: &F,
        features: &F,
        labels: &DVector<f64>,
        observations_is_missing: Option<&[bool]>,
    ) -> Result<Box<dyn Distribution>>;
}
