//! Trials and their measurements.

use std::collections::BTreeMap;
use std::time::SystemTime;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::param::{ParamValue, ParameterDict};
use crate::types::TrialState;

/// Metric values recorded for a trial.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// Metric values keyed by metric name.
    pub metrics: BTreeMap<String, f64>,
}

impl Measurement {
    /// Creates an empty measurement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a metric value.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Returns the value of a metric.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// One candidate point plus its evaluation outcome.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trial {
    /// Identifier assigned by the caller (0 for optimizer-generated trials).
    pub id: u64,
    /// Parameter values keyed by name.
    pub parameters: ParameterDict,
    /// When the trial was created; prior trials are replayed in this order.
    pub creation_time: SystemTime,
    /// Lifecycle state.
    pub state: TrialState,
    /// The final measurement, present once completed.
    pub final_measurement: Option<Measurement>,
}

impl Trial {
    /// Creates an active trial stamped with the current time.
    #[must_use]
    pub fn new(parameters: ParameterDict) -> Self {
        Self {
            id: 0,
            parameters,
            creation_time: SystemTime::now(),
            state: TrialState::Active,
            final_measurement: None,
        }
    }

    /// Sets the identifier.
    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Overrides the creation time.
    #[must_use]
    pub fn with_creation_time(mut self, creation_time: SystemTime) -> Self {
        self.creation_time = creation_time;
        self
    }

    /// Adds or replaces one parameter value.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Marks the trial completed with the given measurement.
    pub fn complete(&mut self, measurement: Measurement) {
        self.final_measurement = Some(measurement);
        self.state = TrialState::Completed;
    }

    /// Returns `true` once the trial carries a final measurement.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == TrialState::Completed
    }

    /// Returns a final metric value, if any.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.final_measurement.as_ref().and_then(|m| m.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_sets_state_and_measurement() {
        let mut trial = Trial::new(ParameterDict::new()).with_param("x", ParamValue::Float(0.5));
        assert!(!trial.is_completed());
        assert_eq!(trial.metric("acquisition"), None);

        trial.complete(Measurement::new().with_metric("acquisition", 1.25));

        assert!(trial.is_completed());
        assert_eq!(trial.metric("acquisition"), Some(1.25));
    }
}
