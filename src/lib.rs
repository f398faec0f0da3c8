#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Decision-making core of a Bayesian optimization engine. Given the
//! predictive distribution of a surrogate model, it scores candidate points
//! with an acquisition function, keeps exploration inside a trust region
//! around observed points, and maximizes the resulting score with a
//! vectorized ask/evaluate/tell optimizer.
//!
//! # Getting Started
//!
//! Maximize an arbitrary array score with random search:
//!
//! ```
//! use acqopt::prelude::*;
//! use nalgebra::{DMatrix, DVector};
//!
//! let problem = ProblemStatement::new(
//!     SearchSpace::new()
//!         .add_float("x", 0.0, 1.0)
//!         .add_float("y", 0.0, 1.0),
//! );
//! let converter = TrialToArrayConverter::from_problem(&problem).unwrap();
//!
//! let optimizer = VectorizedOptimizer::builder(RandomStrategyFactory)
//!     .suggestion_batch_size(25)
//!     .max_evaluations(1_000)
//!     .build();
//!
//! // Peak at (0.3, 0.7).
//! let score = |xs: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> {
//!     Ok(DVector::from_fn(xs.nrows(), |i, _| {
//!         -((xs[(i, 0)] - 0.3).powi(2) + (xs[(i, 1)] - 0.7).powi(2))
//!     }))
//! };
//!
//! let best = optimizer.optimize(&converter, &score, 3, None, Some(7)).unwrap();
//! assert_eq!(best.len(), 3);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`AcquisitionFunction`](acquisition::AcquisitionFunction) | Turn a predictive distribution into a per-row score (UCB, EI, PI, qEI, qUCB, ...). |
//! | [`TrustRegion`](trust_region::TrustRegion) | Union of L-infinity balls around trusted points; penalizes far-away candidates. |
//! | [`GpBanditAcquisitionBuilder`](builder::GpBanditAcquisitionBuilder) | Compose a surrogate ensemble, an acquisition function and a trust region into callables. |
//! | [`VectorizedStrategy`](optimizer::VectorizedStrategy) | Pluggable search policy driven through `init_state` / `suggest` / `update`. |
//! | [`VectorizedOptimizer`](optimizer::VectorizedOptimizer) | Run the ask/evaluate/tell loop and return the best trials. |
//! | [`ArrayConverter`](converter::ArrayConverter) | Map trials to feature arrays and back. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on the problem, parameter and trial types | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key optimization points | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

pub mod acquisition;
pub mod builder;
pub mod converter;
pub mod distribution;
mod error;
pub mod features;
mod linalg;
pub mod model;
pub mod optimizer;
mod param;
pub mod problem;
mod rng_util;
mod trial;
pub mod trust_region;
mod types;

pub use error::{Error, Result};
pub use features::ContinuousAndCategorical;
pub use param::{ParamValue, ParameterDict};
pub use trial::{Measurement, Trial};
pub use types::{ObjectiveMetricGoal, TrialState};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use acqopt::prelude::*;
/// ```
pub mod prelude {
    pub use crate::acquisition::{
        AcquisitionFunction, Ei, HyperVolumeScalarization, Pi, Qei, Qucb, Ucb,
    };
    pub use crate::builder::{
        AcquisitionBuilder, BuildOptions, GpBanditAcquisitionBuilder,
        GpBanditMultiAcquisitionBuilder,
    };
    pub use crate::converter::{ArrayConverter, PaddedTrialToArrayConverter, TrialToArrayConverter};
    pub use crate::distribution::Distribution;
    pub use crate::error::{Error, Result};
    pub use crate::features::ContinuousAndCategorical;
    pub use crate::model::{GaussianProcess, SurrogateModel};
    pub use crate::optimizer::{
        DifferentialEvolutionFactory, RandomStrategyFactory, VectorizedOptimizer,
        VectorizedStrategy, VectorizedStrategyFactory,
    };
    pub use crate::param::{ParamValue, ParameterDict};
    pub use crate::problem::{MetricInformation, ProblemStatement, SearchSpace};
    pub use crate::trial::{Measurement, Trial};
    pub use crate::trust_region::{TrustRegion, TrustRegionWithCategorical};
    pub use crate::types::{ObjectiveMetricGoal, TrialState};
}
