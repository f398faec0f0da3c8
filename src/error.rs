#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a builder output is accessed before `build()` completed.
    #[error("acquisition must be built first via build()")]
    NotBuilt,

    /// Returned when a combination of options is not supported, e.g. a trust
    /// region over continuous-and-categorical features in the multi-acquisition
    /// builder.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Returned when an option value is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Returned when the lower bound is greater than the upper bound.
    #[error("invalid bounds for '{name}': low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The parameter whose bounds are invalid.
        name: String,
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when two arrays that must agree in shape do not.
    #[error("dimension mismatch in {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Which array or axis disagreed.
        what: &'static str,
        /// The expected size.
        expected: usize,
        /// The actual size.
        got: usize,
    },

    /// Returned when an improvement-based acquisition is evaluated without labels.
    #[error("acquisition function requires observed labels")]
    MissingLabels,

    /// Returned when the surrogate ensemble contains no parameter sets.
    #[error("surrogate ensemble must contain at least one parameter set")]
    EmptyEnsemble,

    /// Returned when the Cholesky factorization still fails after all jitter retries.
    #[error("cholesky factorization failed after {attempts} attempts")]
    NumericalFailure {
        /// Number of factorization attempts made.
        attempts: usize,
    },

    /// Returned when a model parameter required by the surrogate is absent.
    #[error("missing model parameter '{0}'")]
    MissingModelParameter(&'static str),

    /// Returned when a trial cannot be mapped to or from a feature array.
    #[error("conversion error: {0}")]
    Conversion(String),
}

pub type Result<T> = core::result::Result<T, Error>;
