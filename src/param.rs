//! Parameter value storage types.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Represents a concrete parameter value of a trial.
///
/// For categorical parameters, the `Categorical` variant stores the index
/// into the choices array.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParamValue {
    /// A floating-point parameter value.
    Float(f64),
    /// An integer parameter value.
    Int(i64),
    /// A categorical parameter value, stored as an index into the choices array.
    Categorical(usize),
}

/// Parameter values of one trial, keyed by parameter name.
pub type ParameterDict = BTreeMap<String, ParamValue>;
