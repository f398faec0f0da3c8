//! Mapping between trials and feature arrays.
//!
//! Every search-space parameter becomes one or more columns of a `[0, 1]`
//! feature array:
//!
//! - float and integer parameters become one column, scaled linearly (or in
//!   log space for log-scale parameters);
//! - categorical parameters become a one-hot block with one column per
//!   choice.
//!
//! The layout is described by the converter's [`ArraySpec`]s, which the
//! trust region and the optimization strategies consume.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::features::ContinuousAndCategorical;
use crate::param::{ParamValue, ParameterDict};
use crate::problem::{Domain, ParameterConfig, ProblemStatement};
use crate::trial::Trial;

/// How the columns of one [`ArraySpec`] encode a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArraySpecType {
    /// A single scaled column.
    Continuous,
    /// One column per choice, exactly one of which is hot.
    OneHotEmbedding,
}

/// Column layout of one encoded parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArraySpec {
    /// Name of the parameter.
    pub name: String,
    /// Encoding kind.
    pub spec_type: ArraySpecType,
    /// Number of columns occupied.
    pub num_dimensions: usize,
}

impl ArraySpec {
    /// A single continuous column.
    #[must_use]
    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec_type: ArraySpecType::Continuous,
            num_dimensions: 1,
        }
    }

    /// A one-hot block of `num_choices` columns.
    #[must_use]
    pub fn one_hot(name: impl Into<String>, num_choices: usize) -> Self {
        Self {
            name: name.into(),
            spec_type: ArraySpecType::OneHotEmbedding,
            num_dimensions: num_choices,
        }
    }
}

/// Converts trials to feature rows and feature rows back to parameters.
pub trait ArrayConverter: Send + Sync {
    /// Layout of the encoded, non-padded columns.
    fn output_specs(&self) -> &[ArraySpec];

    /// Total number of columns produced by [`ArrayConverter::to_features`].
    fn num_features(&self) -> usize {
        self.output_specs().iter().map(|s| s.num_dimensions).sum()
    }

    /// Encodes trials, one row per trial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conversion`] if a trial lacks a parameter or holds a
    /// value of the wrong kind.
    fn to_features(&self, trials: &[Trial]) -> Result<DMatrix<f64>>;

    /// Decodes feature rows into parameter values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the column count is wrong and
    /// [`Error::Conversion`] for non-finite values.
    fn to_parameters(&self, features: &DMatrix<f64>) -> Result<Vec<ParameterDict>>;

    /// Whether rows and columns are padded.
    fn is_padded(&self) -> bool {
        false
    }

    /// Per-column flags marking padded columns, if any.
    fn dimension_is_missing(&self) -> Option<Vec<bool>> {
        None
    }
}

/// Internal-space bounds of one numeric parameter.
#[derive(Clone, Copy, Debug)]
struct Scale {
    low: f64,
    high: f64,
    log_scale: bool,
}

impl Scale {
    fn encode(self, value: f64) -> f64 {
        let v = if self.log_scale { value.ln() } else { value };
        if self.high > self.low {
            (v - self.low) / (self.high - self.low)
        } else {
            0.5
        }
    }

    fn decode(self, x: f64) -> f64 {
        let v = self.low + x.clamp(0.0, 1.0) * (self.high - self.low);
        if self.log_scale { v.exp() } else { v }
    }
}

#[derive(Clone, Debug)]
enum Encoding {
    Float { scale: Scale, low: f64, high: f64 },
    Int { scale: Scale, low: i64, high: i64 },
    Categorical { num_choices: usize },
}

#[allow(clippy::cast_precision_loss)]
fn encoding_for(param: &ParameterConfig) -> Result<Encoding> {
    match &param.domain {
        Domain::Float {
            low,
            high,
            log_scale,
        } => {
            let (low, high) = (*low, *high);
            check_bounds(&param.name, low, high, *log_scale)?;
            let scale = if *log_scale {
                Scale {
                    low: low.ln(),
                    high: high.ln(),
                    log_scale: true,
                }
            } else {
                Scale {
                    low,
                    high,
                    log_scale: false,
                }
            };
            Ok(Encoding::Float { scale, low, high })
        }
        Domain::Int {
            low,
            high,
            log_scale,
        } => {
            let (l, h) = (*low as f64, *high as f64);
            check_bounds(&param.name, l, h, *log_scale)?;
            let scale = if *log_scale {
                Scale {
                    low: l.ln(),
                    high: h.ln(),
                    log_scale: true,
                }
            } else {
                Scale {
                    low: l,
                    high: h,
                    log_scale: false,
                }
            };
            Ok(Encoding::Int {
                scale,
                low: *low,
                high: *high,
            })
        }
        Domain::Categorical { choices } => {
            if choices.is_empty() {
                return Err(Error::InvalidConfiguration(format!(
                    "categorical parameter '{}' has no choices",
                    param.name
                )));
            }
            Ok(Encoding::Categorical {
                num_choices: choices.len(),
            })
        }
    }
}

fn check_bounds(name: &str, low: f64, high: f64, log_scale: bool) -> Result<()> {
    if !low.is_finite() || !high.is_finite() || low > high {
        return Err(Error::InvalidBounds {
            name: name.to_string(),
            low,
            high,
        });
    }
    if log_scale && low <= 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "log-scale parameter '{name}' requires a positive lower bound, got {low}"
        )));
    }
    Ok(())
}

/// Encodes trials of one problem into `[0, 1]` feature arrays.
#[derive(Clone, Debug)]
pub struct TrialToArrayConverter {
    names: Vec<String>,
    encodings: Vec<Encoding>,
    specs: Vec<ArraySpec>,
}

impl TrialToArrayConverter {
    /// Builds a converter for the problem's search space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] or [`Error::InvalidConfiguration`]
    /// for malformed parameter domains.
    pub fn from_problem(problem: &ProblemStatement) -> Result<Self> {
        let params = &problem.search_space.parameters;
        let mut names = Vec::with_capacity(params.len());
        let mut encodings = Vec::with_capacity(params.len());
        let mut specs = Vec::with_capacity(params.len());
        for param in params {
            let encoding = encoding_for(param)?;
            specs.push(match &encoding {
                Encoding::Float { .. } | Encoding::Int { .. } => {
                    ArraySpec::continuous(param.name.clone())
                }
                Encoding::Categorical { num_choices } => {
                    ArraySpec::one_hot(param.name.clone(), *num_choices)
                }
            });
            names.push(param.name.clone());
            encodings.push(encoding);
        }
        Ok(Self {
            names,
            encodings,
            specs,
        })
    }

    /// Values of `metric` per trial; NaN where the trial has no such metric.
    #[must_use]
    pub fn to_labels(&self, trials: &[Trial], metric: &str) -> DVector<f64> {
        DVector::from_iterator(
            trials.len(),
            trials.iter().map(|t| t.metric(metric).unwrap_or(f64::NAN)),
        )
    }

    /// Splits flat features into continuous columns and category indices.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the column count is wrong.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_continuous_and_categorical(
        &self,
        features: &DMatrix<f64>,
    ) -> Result<ContinuousAndCategorical> {
        self.check_columns(features.ncols())?;
        let mut continuous_cols = Vec::new();
        let mut categorical_blocks = Vec::new();
        let mut offset = 0;
        for spec in &self.specs {
            match spec.spec_type {
                ArraySpecType::Continuous => continuous_cols.push(offset),
                ArraySpecType::OneHotEmbedding => {
                    categorical_blocks.push((offset, spec.num_dimensions));
                }
            }
            offset += spec.num_dimensions;
        }

        let n = features.nrows();
        let continuous =
            DMatrix::from_fn(n, continuous_cols.len(), |i, j| features[(i, continuous_cols[j])]);
        let categorical = DMatrix::from_fn(n, categorical_blocks.len(), |i, j| {
            let (start, len) = categorical_blocks[j];
            argmax(features.row(i).iter().skip(start).take(len).copied()) as u32
        });
        ContinuousAndCategorical::new(continuous, categorical)
    }

    fn check_columns(&self, got: usize) -> Result<()> {
        let expected = self.num_features();
        if got == expected {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                what: "feature columns",
                expected,
                got,
            })
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn encode_trial(&self, trial: &Trial, row: &mut [f64]) -> Result<()> {
        let mut offset = 0;
        for (name, encoding) in self.names.iter().zip(&self.encodings) {
            let value = trial.parameters.get(name).ok_or_else(|| {
                Error::Conversion(format!("trial {} has no parameter '{name}'", trial.id))
            })?;
            match (encoding, value) {
                (Encoding::Float { scale, .. }, ParamValue::Float(v)) => {
                    row[offset] = scale.encode(*v);
                    offset += 1;
                }
                (Encoding::Int { scale, .. }, ParamValue::Int(v)) => {
                    row[offset] = scale.encode(*v as f64);
                    offset += 1;
                }
                (Encoding::Categorical { num_choices }, ParamValue::Categorical(index)) => {
                    if *index >= *num_choices {
                        return Err(Error::Conversion(format!(
                            "category {index} of '{name}' is out of range (0..{num_choices})"
                        )));
                    }
                    row[offset + index] = 1.0;
                    offset += num_choices;
                }
                _ => {
                    return Err(Error::Conversion(format!(
                        "parameter '{name}' holds {value:?}, which does not match its domain"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Index of the largest value; ties go to the first.
fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

impl ArrayConverter for TrialToArrayConverter {
    fn output_specs(&self) -> &[ArraySpec] {
        &self.specs
    }

    fn to_features(&self, trials: &[Trial]) -> Result<DMatrix<f64>> {
        let d = self.num_features();
        let mut out = DMatrix::zeros(trials.len(), d);
        let mut row = vec![0.0; d];
        for (i, trial) in trials.iter().enumerate() {
            row.fill(0.0);
            self.encode_trial(trial, &mut row)?;
            for (j, v) in row.iter().enumerate() {
                out[(i, j)] = *v;
            }
        }
        Ok(out)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_parameters(&self, features: &DMatrix<f64>) -> Result<Vec<ParameterDict>> {
        self.check_columns(features.ncols())?;
        let mut out = Vec::with_capacity(features.nrows());
        for i in 0..features.nrows() {
            let row = features.row(i);
            if let Some(bad) = row.iter().find(|v| !v.is_finite()) {
                return Err(Error::Conversion(format!(
                    "row {i} contains non-finite feature {bad}"
                )));
            }
            let mut params = ParameterDict::new();
            let mut offset = 0;
            for (name, encoding) in self.names.iter().zip(&self.encodings) {
                let value = match encoding {
                    Encoding::Float { scale, low, high } => {
                        let v = scale.decode(row[offset]);
                        offset += 1;
                        ParamValue::Float(v.clamp(*low, *high))
                    }
                    Encoding::Int { scale, low, high } => {
                        let v = scale.decode(row[offset]).round() as i64;
                        offset += 1;
                        ParamValue::Int(v.clamp(*low, *high))
                    }
                    Encoding::Categorical { num_choices } => {
                        let index =
                            argmax(row.iter().skip(offset).take(*num_choices).copied());
                        offset += num_choices;
                        ParamValue::Categorical(index)
                    }
                };
                params.insert(name.clone(), value);
            }
            out.push(params);
        }
        Ok(out)
    }
}

/// Wraps a [`TrialToArrayConverter`] and pads its arrays to fixed multiples.
///
/// Columns are padded with zeros up to a multiple of `feature_padding`;
/// rows produced by [`ArrayConverter::to_features`] are padded with NaN up to
/// a multiple of `trial_padding`. Padding keeps array shapes stable across
/// calls with slightly different trial counts.
#[derive(Clone, Debug)]
pub struct PaddedTrialToArrayConverter {
    inner: TrialToArrayConverter,
    feature_padding: usize,
    trial_padding: usize,
}

impl PaddedTrialToArrayConverter {
    /// Wraps `inner`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either padding is zero.
    pub fn new(
        inner: TrialToArrayConverter,
        feature_padding: usize,
        trial_padding: usize,
    ) -> Result<Self> {
        if feature_padding == 0 || trial_padding == 0 {
            return Err(Error::InvalidConfiguration(
                "padding multiples must be at least 1".into(),
            ));
        }
        Ok(Self {
            inner,
            feature_padding,
            trial_padding,
        })
    }

    /// The wrapped converter.
    #[must_use]
    pub fn inner(&self) -> &TrialToArrayConverter {
        &self.inner
    }

    /// Row count after padding `num_trials` rows.
    #[must_use]
    pub fn padded_num_trials(&self, num_trials: usize) -> usize {
        num_trials.div_ceil(self.trial_padding) * self.trial_padding
    }

    /// Labels padded with NaN to the same row count as the features.
    #[must_use]
    pub fn to_labels(&self, trials: &[Trial], metric: &str) -> DVector<f64> {
        let labels = self.inner.to_labels(trials, metric);
        let n = self.padded_num_trials(trials.len());
        DVector::from_fn(n, |i, _| labels.get(i).copied().unwrap_or(f64::NAN))
    }

    /// Per-row flags marking padded rows for `num_trials` trials.
    #[must_use]
    pub fn observations_is_missing(&self, num_trials: usize) -> Vec<bool> {
        (0..self.padded_num_trials(num_trials))
            .map(|i| i >= num_trials)
            .collect()
    }
}

impl ArrayConverter for PaddedTrialToArrayConverter {
    fn output_specs(&self) -> &[ArraySpec] {
        self.inner.output_specs()
    }

    fn num_features(&self) -> usize {
        self.inner.num_features().div_ceil(self.feature_padding) * self.feature_padding
    }

    fn to_features(&self, trials: &[Trial]) -> Result<DMatrix<f64>> {
        let raw = self.inner.to_features(trials)?;
        let rows = self.padded_num_trials(trials.len());
        let cols = self.num_features();
        Ok(DMatrix::from_fn(rows, cols, |i, j| {
            if i >= raw.nrows() {
                f64::NAN
            } else if j >= raw.ncols() {
                0.0
            } else {
                raw[(i, j)]
            }
        }))
    }

    fn to_parameters(&self, features: &DMatrix<f64>) -> Result<Vec<ParameterDict>> {
        let expected = self.num_features();
        if features.ncols() != expected {
            return Err(Error::DimensionMismatch {
                what: "padded feature columns",
                expected,
                got: features.ncols(),
            });
        }
        let unpadded = features.columns(0, self.inner.num_features()).into_owned();
        self.inner.to_parameters(&unpadded)
    }

    fn is_padded(&self) -> bool {
        true
    }

    fn dimension_is_missing(&self) -> Option<Vec<bool>> {
        let real = self.inner.num_features();
        Some((0..self.num_features()).map(|j| j >= real).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::SearchSpace;

    fn problem() -> ProblemStatement {
        ProblemStatement::new(
            SearchSpace::new()
                .add_float("lr", 0.0, 2.0)
                .add_log_float("decay", 1e-4, 1.0)
                .add_int("layers", 1, 5)
                .add_categorical("act", ["relu", "tanh", "gelu"]),
        )
    }

    fn trial(lr: f64, decay: f64, layers: i64, act: usize) -> Trial {
        Trial::new(ParameterDict::new())
            .with_param("lr", ParamValue::Float(lr))
            .with_param("decay", ParamValue::Float(decay))
            .with_param("layers", ParamValue::Int(layers))
            .with_param("act", ParamValue::Categorical(act))
    }

    #[test]
    fn specs_follow_search_space() {
        let c = TrialToArrayConverter::from_problem(&problem()).unwrap();
        let kinds: Vec<_> = c.output_specs().iter().map(|s| s.spec_type).collect();
        assert_eq!(kinds, vec![
            ArraySpecType::Continuous,
            ArraySpecType::Continuous,
            ArraySpecType::Continuous,
            ArraySpecType::OneHotEmbedding,
        ]);
        assert_eq!(c.num_features(), 6);
    }

    #[test]
    fn encodes_into_unit_cube() {
        let c = TrialToArrayConverter::from_problem(&problem()).unwrap();
        let f = c.to_features(&[trial(0.5, 1e-2, 5, 2)]).unwrap();
        assert!((f[(0, 0)] - 0.25).abs() < 1e-12);
        assert!((f[(0, 1)] - 0.5).abs() < 1e-12);
        assert!((f[(0, 2)] - 1.0).abs() < 1e-12);
        assert_eq!((f[(0, 3)], f[(0, 4)], f[(0, 5)]), (0.0, 0.0, 1.0));
    }

    #[test]
    fn decode_rounds_clamps_and_takes_argmax() {
        let c = TrialToArrayConverter::from_problem(&problem()).unwrap();
        let features = DMatrix::from_row_slice(1, 6, &[1.3, 0.5, 0.6, 0.2, 0.7, 0.1]);
        let params = &c.to_parameters(&features).unwrap()[0];
        assert_eq!(params["lr"], ParamValue::Float(2.0));
        let ParamValue::Float(decay) = params["decay"] else {
            panic!("expected float");
        };
        assert!((decay - 1e-2).abs() < 1e-12);
        // 1 + 0.6 * 4 = 3.4
        assert_eq!(params["layers"], ParamValue::Int(3));
        assert_eq!(params["act"], ParamValue::Categorical(1));
    }

    #[test]
    fn rejects_bad_bounds_and_values() {
        let bad = ProblemStatement::new(SearchSpace::new().add_float("x", 1.0, 0.0));
        assert!(matches!(
            TrialToArrayConverter::from_problem(&bad),
            Err(Error::InvalidBounds { .. })
        ));
        let bad_log = ProblemStatement::new(SearchSpace::new().add_log_float("x", 0.0, 1.0));
        assert!(matches!(
            TrialToArrayConverter::from_problem(&bad_log),
            Err(Error::InvalidConfiguration(_))
        ));

        let c = TrialToArrayConverter::from_problem(&problem()).unwrap();
        let wrong_kind = trial(0.5, 1e-2, 2, 0).with_param("layers", ParamValue::Float(2.0));
        assert!(matches!(
            c.to_features(&[wrong_kind]),
            Err(Error::Conversion(_))
        ));
        assert!(matches!(
            c.to_features(&[trial(0.5, 1e-2, 2, 7)]),
            Err(Error::Conversion(_))
        ));
        assert!(matches!(
            c.to_parameters(&DMatrix::zeros(1, 5)),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn labels_are_nan_when_missing() {
        let c = TrialToArrayConverter::from_problem(&problem()).unwrap();
        let mut done = trial(0.1, 1e-3, 1, 0);
        done.complete(crate::trial::Measurement::new().with_metric("acc", 0.9));
        let labels = c.to_labels(&[done, trial(0.1, 1e-3, 1, 0)], "acc");
        assert_eq!(labels[0], 0.9);
        assert!(labels[1].is_nan());
    }

    #[test]
    fn splits_continuous_and_categorical() {
        let c = TrialToArrayConverter::from_problem(&problem()).unwrap();
        let f = c.to_features(&[trial(1.0, 1e-4, 1, 1), trial(0.0, 1.0, 5, 2)]).unwrap();
        let split = c.to_continuous_and_categorical(&f).unwrap();
        assert_eq!(split.continuous.shape(), (2, 3));
        assert_eq!(split.categorical.shape(), (2, 1));
        assert_eq!(split.categorical[(0, 0)], 1);
        assert_eq!(split.categorical[(1, 0)], 2);
    }

    #[test]
    fn padded_converter_pads_rows_and_columns() {
        let inner = TrialToArrayConverter::from_problem(&problem()).unwrap();
        let c = PaddedTrialToArrayConverter::new(inner, 4, 3).unwrap();
        assert!(c.is_padded());
        assert_eq!(c.num_features(), 8);
        assert_eq!(
            c.dimension_is_missing().unwrap(),
            vec![false, false, false, false, false, false, true, true]
        );

        let f = c
            .to_features(&[trial(0.5, 1e-2, 3, 0), trial(1.0, 1e-2, 3, 1)])
            .unwrap();
        assert_eq!(f.shape(), (3, 8));
        assert_eq!(f[(0, 6)], 0.0);
        assert!(f.row(2).iter().all(|v| v.is_nan()));
        assert_eq!(c.observations_is_missing(2), vec![false, false, true]);

        let params = c.to_parameters(&f.rows(0, 2).into_owned()).unwrap();
        assert_eq!(params[1]["act"], ParamValue::Categorical(1));
    }

    #[test]
    fn zero_padding_is_rejected() {
        let inner = TrialToArrayConverter::from_problem(&problem()).unwrap();
        assert!(PaddedTrialToArrayConverter::new(inner, 0, 1).is_err());
    }
}
