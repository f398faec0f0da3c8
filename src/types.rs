//! Core enums shared across the crate.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether a metric should be maximized or minimized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ObjectiveMetricGoal {
    /// Larger values are better.
    Maximize,
    /// Smaller values are better.
    Minimize,
}

/// The state of a trial in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrialState {
    /// The trial was suggested but has no final measurement yet.
    #[default]
    Active,
    /// The trial carries a final measurement.
    Completed,
}
