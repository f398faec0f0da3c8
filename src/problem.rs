//! Search space and metric definitions.
//!
//! A [`ProblemStatement`] is the owned description of what is being
//! optimized. The acquisition builders produce a fresh copy of it whose
//! metrics are replaced by synthetic acquisition metrics; cloning is a deep
//! copy, so the caller's statement is never aliased.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::ObjectiveMetricGoal;

/// The domain a single parameter takes values from.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Domain {
    /// Continuous range `[low, high]`.
    Float {
        /// Lower bound (inclusive).
        low: f64,
        /// Upper bound (inclusive).
        high: f64,
        /// Whether values are encoded in log space.
        log_scale: bool,
    },
    /// Integer range `[low, high]`.
    Int {
        /// Lower bound (inclusive).
        low: i64,
        /// Upper bound (inclusive).
        high: i64,
        /// Whether values are encoded in log space.
        log_scale: bool,
    },
    /// Unordered set of named choices.
    Categorical {
        /// The available choices.
        choices: Vec<String>,
    },
}

/// A named parameter and its domain.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterConfig {
    /// Parameter name, unique within a search space.
    pub name: String,
    /// Values the parameter may take.
    pub domain: Domain,
}

/// An ordered list of parameter definitions.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchSpace {
    /// Parameters in encoding order.
    pub parameters: Vec<ParameterConfig>,
}

impl SearchSpace {
    /// Creates an empty search space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a linear-scale float parameter.
    #[must_use]
    pub fn add_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, Domain::Float {
            low,
            high,
            log_scale: false,
        })
    }

    /// Adds a log-scale float parameter.
    #[must_use]
    pub fn add_log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, Domain::Float {
            low,
            high,
            log_scale: true,
        })
    }

    /// Adds an integer parameter.
    #[must_use]
    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(name, Domain::Int {
            low,
            high,
            log_scale: false,
        })
    }

    /// Adds a categorical parameter.
    #[must_use]
    pub fn add_categorical<S: Into<String>>(
        self,
        name: impl Into<String>,
        choices: impl IntoIterator<Item = S>,
    ) -> Self {
        self.add(name, Domain::Categorical {
            choices: choices.into_iter().map(Into::into).collect(),
        })
    }

    fn add(mut self, name: impl Into<String>, domain: Domain) -> Self {
        self.parameters.push(ParameterConfig {
            name: name.into(),
            domain,
        });
        self
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// A metric and the direction it should be optimized in.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricInformation {
    /// Metric name.
    pub name: String,
    /// Optimization direction.
    pub goal: ObjectiveMetricGoal,
}

impl MetricInformation {
    /// A metric to be maximized.
    #[must_use]
    pub fn maximize(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: ObjectiveMetricGoal::Maximize,
        }
    }

    /// A metric to be minimized.
    #[must_use]
    pub fn minimize(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: ObjectiveMetricGoal::Minimize,
        }
    }
}

/// Search space, metrics and free-form metadata of an optimization problem.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProblemStatement {
    /// The parameters being searched over.
    pub search_space: SearchSpace,
    /// Metrics to optimize.
    pub metric_information: Vec<MetricInformation>,
    /// Arbitrary key/value annotations.
    pub metadata: BTreeMap<String, String>,
}

impl ProblemStatement {
    /// Creates a problem without metrics.
    #[must_use]
    pub fn new(search_space: SearchSpace) -> Self {
        Self {
            search_space,
            metric_information: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, metric: MetricInformation) -> Self {
        self.metric_information.push(metric);
        self
    }

    /// Returns a copy of this problem whose metrics are replaced by
    /// maximize-type metrics with the given names.
    pub(crate) fn with_acquisition_metrics<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut acquisition_problem = self.clone();
        acquisition_problem.metric_information =
            names.into_iter().map(MetricInformation::maximize).collect();
        acquisition_problem
    }
}
