//! Declaration of named, bounded model parameters.
//!
//! A model declares its parameters up front through a
//! [`ModelParameterBuilder`]: each one carries bounds, a size and an
//! optional regularizer. The builder then produces initial values, clamps
//! candidate values into their bounds and sums the regularization penalty.
//! Concrete values travel as a [`ParameterValues`] map.

use std::collections::BTreeMap;

use nalgebra::DVector;

use crate::error::{Error, Result};
use crate::rng_util;

/// Penalty on a parameter value, added to the training loss.
pub type Regularizer = fn(&DVector<f64>) -> f64;

/// One named parameter with box bounds.
#[derive(Clone, Debug)]
pub struct ModelParameter {
    /// Parameter name.
    pub name: &'static str,
    /// Lower bound, strictly positive.
    pub low: f64,
    /// Upper bound.
    pub high: f64,
    /// Number of scalar entries.
    pub size: usize,
    /// Optional penalty.
    pub regularizer: Option<Regularizer>,
}

impl ModelParameter {
    /// A positive parameter of `size` entries bounded by `[low, high]`.
    #[must_use]
    pub fn bounded(name: &'static str, low: f64, high: f64, size: usize) -> Self {
        Self {
            name,
            low,
            high,
            size,
            regularizer: None,
        }
    }

    /// Attaches a regularizer.
    #[must_use]
    pub fn with_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.regularizer = Some(regularizer);
        self
    }
}

/// Concrete values for a model's parameters, keyed by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterValues(BTreeMap<String, DVector<f64>>);

impl ParameterValues {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: DVector<f64>) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Sets a scalar value.
    #[must_use]
    pub fn with_scalar(self, name: impl Into<String>, value: f64) -> Self {
        self.with(name, DVector::from_element(1, value))
    }

    /// Returns a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingModelParameter`] if `name` is absent.
    pub fn get(&self, name: &'static str) -> Result<&DVector<f64>> {
        self.0.get(name).ok_or(Error::MissingModelParameter(name))
    }

    /// Returns the first entry of a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingModelParameter`] if `name` is absent or empty.
    pub fn scalar(&self, name: &'static str) -> Result<f64> {
        self.get(name)?
            .iter()
            .next()
            .copied()
            .ok_or(Error::MissingModelParameter(name))
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DVector<f64>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Accumulates parameter declarations for one model.
#[derive(Clone, Debug, Default)]
pub struct ModelParameterBuilder {
    parameters: Vec<ModelParameter>,
}

impl ModelParameterBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: ModelParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Declared parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[ModelParameter] {
        &self.parameters
    }

    /// Draws initial values log-uniformly within each parameter's bounds.
    #[must_use]
    pub fn init(&self, seed: u64) -> ParameterValues {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut values = ParameterValues::new();
        for p in &self.parameters {
            let (lo, hi) = (p.low.ln(), p.high.ln());
            let v = DVector::from_fn(p.size, |_, _| rng_util::f64_range(&mut rng, lo, hi).exp());
            values = values.with(p.name, v);
        }
        values
    }

    /// Clamps every declared parameter into its bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if a declared parameter is missing or has the wrong
    /// size.
    pub fn constrain(&self, values: &ParameterValues) -> Result<ParameterValues> {
        let mut out = values.clone();
        for p in &self.parameters {
            let v = checked(values, p)?;
            out = out.with(p.name, v.map(|x| x.clamp(p.low, p.high)));
        }
        Ok(out)
    }

    /// Sum of all regularization penalties.
    ///
    /// # Errors
    ///
    /// Returns an error if a declared parameter is missing or has the wrong
    /// size.
    pub fn regularization(&self, values: &ParameterValues) -> Result<f64> {
        let mut total = 0.0;
        for p in &self.parameters {
            let v = checked(values, p)?;
            if let Some(reg) = p.regularizer {
                total += reg(v);
            }
        }
        Ok(total)
    }

    /// Checks that every declared parameter is present with the right size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingModelParameter`] or [`Error::DimensionMismatch`].
    pub fn validate(&self, values: &ParameterValues) -> Result<()> {
        for p in &self.parameters {
            checked(values, p)?;
        }
        Ok(())
    }
}

fn checked<'a>(values: &'a ParameterValues, p: &ModelParameter) -> Result<&'a DVector<f64>> {
    let v = values.get(p.name)?;
    if v.len() == p.size {
        Ok(v)
    } else {
        Err(Error::DimensionMismatch {
            what: "model parameter size",
            expected: p.size,
            got: v.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ModelParameterBuilder {
        ModelParameterBuilder::new()
            .parameter(ModelParameter::bounded("a", 1e-2, 1e2, 3).with_regularizer(|v| v.sum()))
            .parameter(ModelParameter::bounded("b", 1e-3, 10.0, 1))
    }

    #[test]
    fn init_respects_bounds_and_seed() {
        let b = builder();
        let v = b.init(3);
        assert_eq!(v, b.init(3));
        assert_ne!(v, b.init(4));
        assert!(v.get("a").unwrap().iter().all(|x| (1e-2..=1e2).contains(x)));
        assert!((1e-3..=10.0).contains(&v.scalar("b").unwrap()));
    }

    #[test]
    fn constrain_clamps() {
        let b = builder();
        let values = ParameterValues::new()
            .with("a", DVector::from_vec(vec![1e-5, 1.0, 1e5]))
            .with_scalar("b", 100.0);
        let c = b.constrain(&values).unwrap();
        assert_eq!(c.get("a").unwrap().as_slice(), &[1e-2, 1.0, 1e2]);
        assert_eq!(c.scalar("b").unwrap(), 10.0);
    }

    #[test]
    fn regularization_sums_declared_penalties() {
        let b = builder();
        let values = ParameterValues::new()
            .with("a", DVector::from_vec(vec![1.0, 2.0, 3.0]))
            .with_scalar("b", 1.0);
        assert_eq!(b.regularization(&values).unwrap(), 6.0);
    }

    #[test]
    fn missing_or_wrong_size_is_an_error() {
        let b = builder();
        assert!(matches!(
            b.validate(&ParameterValues::new().with_scalar("b", 1.0)),
            Err(Error::MissingModelParameter("a"))
        ));
        let wrong = ParameterValues::new()
            .with("a", DVector::from_vec(vec![1.0]))
            .with_scalar("b", 1.0);
        assert!(matches!(
            b.validate(&wrong),
            Err(Error::DimensionMismatch { expected: 3, got: 1, .. })
        ));
    }
}
