//! Acquisition builders.
//!
//! A builder composes a surrogate model, an ensemble of its parameter sets,
//! the observed data, one or more acquisition functions and an optional
//! trust region into three callables over feature arrays:
//!
//! - `predict_on_array(xs)`: predictive mean and standard deviation;
//! - `acquisition_on_array(xs)`: acquisition scores, with candidates
//!   outside the trust region pushed below `-1e12`;
//! - `sample_on_array(xs, num_samples, seed)`: joint predictive samples.
//!
//! Every accessor returns [`Error::NotBuilt`] until [`AcquisitionBuilder::build`]
//! succeeds. The callables are cheap to clone (`Arc`) and only read shared
//! immutable data, so they can be handed to the optimizer's score function.
//!
//! # Ensembles
//!
//! With `use_vmap` (the default) every parameter set is evaluated
//! independently and the per-member means and standard deviations are
//! collapsed into an equal-weight Gaussian mixture. Without it the ensemble
//! must contain exactly one parameter set and the model's own predictive
//! distribution is used unchanged.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use acqopt::model::GaussianProcess;
//! use acqopt::prelude::*;
//! use nalgebra::{DMatrix, DVector};
//!
//! let problem = ProblemStatement::new(SearchSpace::new().add_float("x", 0.0, 1.0))
//!     .with_metric(MetricInformation::maximize("objective"));
//! let converter = TrialToArrayConverter::from_problem(&problem).unwrap();
//!
//! let model = Arc::new(GaussianProcess::new(1));
//! let params = model.parameters().init(0);
//!
//! let features = DMatrix::from_row_slice(3, 1, &[0.1, 0.5, 0.9]);
//! let labels = DVector::from_vec(vec![0.2, 1.0, 0.4]);
//!
//! let mut builder = GpBanditAcquisitionBuilder::new(Ucb::default());
//! builder
//!     .build(&problem, model, vec![params], features, labels, &converter, BuildOptions::default())
//!     .unwrap();
//!
//! let score = builder.acquisition_on_array().unwrap();
//! let xs = DMatrix::from_row_slice(2, 1, &[0.5, 0.55]);
//! assert_eq!(score(&xs).unwrap().len(), 2);
//! assert!(builder.metadata().unwrap().contains_key("trust_radius"));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::acquisition::{AcquisitionFunction, MultiAcquisition, Ucb};
use crate::converter::ArrayConverter;
use crate::distribution::{Distribution, MixtureSameFamily};
use crate::error::{Error, Result};
use crate::features::{FeatureRepresentation, Features};
use crate::model::SurrogateModel;
use crate::problem::ProblemStatement;
use crate::trust_region::TrustRegionEstimator;

/// Candidates farther than the trust radius score below this value.
pub const TRUST_REGION_PENALTY: f64 = -1e12;

/// Radius at or above which the trust region no longer gates candidates.
const GATING_RADIUS: f64 = 0.5;

/// Metric name of the single-acquisition problem.
pub const ACQUISITION_METRIC: &str = "acquisition";

/// Predictive mean and standard deviation at a batch of points.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// Per-point mean.
    pub mean: DVector<f64>,
    /// Per-point standard deviation.
    pub stddev: DVector<f64>,
}

/// `xs -> Prediction`.
pub type PredictFn<F> = Arc<dyn Fn(&F) -> Result<Prediction> + Send + Sync>;
/// `xs -> scores`; `O` is a vector for one function and a matrix for many.
pub type AcquisitionFn<F, O> = Arc<dyn Fn(&F) -> Result<O> + Send + Sync>;
/// `(xs, num_samples, seed) -> (num_samples, M)` samples.
pub type SampleFn<F> = Arc<dyn Fn(&F, usize, u64) -> Result<DMatrix<f64>> + Send + Sync>;

type DistributionFn<F> = Arc<dyn Fn(&F) -> Result<Box<dyn Distribution>> + Send + Sync>;

/// Optional inputs of [`AcquisitionBuilder::build`].
#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// Per-row flags for padded observations.
    pub observations_is_missing: Option<Vec<bool>>,
    /// Per-column flags for padded features.
    ///
    /// Only the trust region reads this mask. The surrogate model is
    /// configured separately, e.g. with
    /// [`GaussianProcess::with_dimension_is_missing`](crate::model::GaussianProcess::with_dimension_is_missing).
    pub feature_is_missing: Option<Vec<bool>>,
    /// Mix the ensemble members; see the module docs.
    pub use_vmap: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            observations_is_missing: None,
            feature_is_missing: None,
            use_vmap: true,
        }
    }
}

impl BuildOptions {
    /// Flags padded observation rows.
    #[must_use]
    pub fn observations_is_missing(mut self, mask: Vec<bool>) -> Self {
        self.observations_is_missing = Some(mask);
        self
    }

    /// Flags padded feature columns for the trust region. The model needs
    /// its own mask; see [`BuildOptions::feature_is_missing`](#structfield.feature_is_missing).
    #[must_use]
    pub fn feature_is_missing(mut self, mask: Vec<bool>) -> Self {
        self.feature_is_missing = Some(mask);
        self
    }

    /// Enables or disables ensemble mixing.
    #[must_use]
    pub fn use_vmap(mut self, use_vmap: bool) -> Self {
        self.use_vmap = use_vmap;
        self
    }
}

/// Builds prediction, acquisition and sampling callables from a surrogate.
pub trait AcquisitionBuilder<F: Features> {
    /// Scores returned by the acquisition callable.
    type Output;

    /// Composes the callables.
    ///
    /// `ensemble` holds one or more parameter sets of `model`; `features`
    /// and `labels` are the observed data; `converter` supplies the column
    /// layout for the trust region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyEnsemble`] for an empty ensemble,
    /// [`Error::DimensionMismatch`] when labels and features disagree, and
    /// configuration errors specific to each builder.
    #[allow(clippy::too_many_arguments)]
    fn build<M>(
        &mut self,
        problem: &ProblemStatement,
        model: Arc<M>,
        ensemble: Vec<M::Params>,
        features: F,
        labels: DVector<f64>,
        converter: &dyn ArrayConverter,
        options: BuildOptions,
    ) -> Result<()>
    where
        M: SurrogateModel<F> + 'static;

    /// Key/value pairs to attach to suggestions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuilt`] before `build`.
    fn metadata(&self) -> Result<BTreeMap<String, f64>>;

    /// Copy of the problem whose metrics are the acquisition outputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuilt`] before `build`.
    fn acquisition_problem(&self) -> Result<&ProblemStatement>;

    /// The acquisition callable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuilt`] before `build`.
    fn acquisition_on_array(&self) -> Result<AcquisitionFn<F, Self::Output>>;

    /// The prediction callable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuilt`] before `build`.
    fn predict_on_array(&self) -> Result<PredictFn<F>>;

    /// The sampling callable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuilt`] before `build`.
    fn sample_on_array(&self) -> Result<SampleFn<F>>;
}

/// Outputs of a successful build.
struct Built<F, O> {
    problem: ProblemStatement,
    trust_radius: Option<f64>,
    predict: PredictFn<F>,
    acquisition: AcquisitionFn<F, O>,
    sample: SampleFn<F>,
}

impl<F, O> Built<F, O> {
    fn metadata(&self) -> BTreeMap<String, f64> {
        self.trust_radius
            .map(|r| BTreeMap::from([("trust_radius".to_string(), r)]))
            .unwrap_or_default()
    }
}

fn built<F, O>(built: Option<&Built<F, O>>) -> Result<&Built<F, O>> {
    built.ok_or(Error::NotBuilt)
}

/// Predictive distribution of the whole ensemble as a function of `xs`.
fn predictive_distribution<F, M>(
    model: Arc<M>,
    ensemble: Vec<M::Params>,
    features: Arc<F>,
    labels: Arc<DVector<f64>>,
    observations_is_missing: Option<Arc<[bool]>>,
    use_vmap: bool,
) -> Result<DistributionFn<F>>
where
    F: Features,
    M: SurrogateModel<F> + 'static,
{
    if ensemble.is_empty() {
        return Err(Error::EmptyEnsemble);
    }
    if !use_vmap && ensemble.len() != 1 {
        return Err(Error::InvalidConfiguration(format!(
            "use_vmap = false requires exactly one parameter set, got {}",
            ensemble.len()
        )));
    }

    Ok(Arc::new(move |xs: &F| {
        let mask = observations_is_missing.as_deref();
        if !use_vmap {
            return model.posterior_predictive(&ensemble[0], xs, &features, &labels, mask);
        }
        let m = xs.num_rows();
        let k = ensemble.len();
        let mut locs = DMatrix::zeros(m, k);
        let mut scales = DMatrix::zeros(m, k);
        for (member, params) in ensemble.iter().enumerate() {
            let dist = model.posterior_predictive(params, xs, &features, &labels, mask)?;
            locs.set_column(member, &dist.mean());
            scales.set_column(member, &dist.stddev());
        }
        let mixture: Box<dyn Distribution> = Box::new(MixtureSameFamily::new(locs, scales)?);
        Ok(mixture)
    }))
}

fn predict_fn<F: Features>(dist_fn: &DistributionFn<F>) -> PredictFn<F> {
    let dist_fn = Arc::clone(dist_fn);
    Arc::new(move |xs: &F| {
        let dist = dist_fn(xs)?;
        Ok(Prediction {
            mean: dist.mean(),
            stddev: dist.stddev(),
        })
    })
}

fn sample_fn<F: Features>(dist_fn: &DistributionFn<F>) -> SampleFn<F> {
    let dist_fn = Arc::clone(dist_fn);
    Arc::new(move |xs: &F, num_samples: usize, seed: u64| {
        Ok(dist_fn(xs)?.sample(num_samples, seed))
    })
}

/// Distances for rows that must be penalized, or `None` when gating is off.
fn gating_distances<F: Features>(
    trust_region: Option<&Arc<dyn TrustRegionEstimator<F>>>,
    xs: &F,
) -> Result<Option<(f64, DVector<f64>)>> {
    match trust_region {
        Some(tr) if tr.trust_radius() < GATING_RADIUS => {
            Ok(Some((tr.trust_radius(), tr.min_linf_distance(xs)?)))
        }
        _ => Ok(None),
    }
}

fn check_labels<F: Features>(features: &F, labels: &DVector<f64>) -> Result<()> {
    if features.num_rows() == labels.len() {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what: "labels",
            expected: features.num_rows(),
            got: labels.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Single acquisition
// ---------------------------------------------------------------------------

/// Builder for one acquisition function, with optional trust region.
///
/// The trust region is a [`TrustRegion`](crate::trust_region::TrustRegion)
/// for flat arrays and a
/// [`TrustRegionWithCategorical`](crate::trust_region::TrustRegionWithCategorical)
/// for [`ContinuousAndCategorical`](crate::ContinuousAndCategorical) features.
pub struct GpBanditAcquisitionBuilder<F: Features> {
    acquisition_fn: Arc<dyn AcquisitionFunction>,
    use_trust_region: bool,
    built: Option<Built<F, DVector<f64>>>,
}

impl<F: Features> GpBanditAcquisitionBuilder<F> {
    /// Creates a builder with a trust region.
    #[must_use]
    pub fn new(acquisition_fn: impl AcquisitionFunction + 'static) -> Self {
        Self {
            acquisition_fn: Arc::new(acquisition_fn),
            use_trust_region: true,
            built: None,
        }
    }

    /// Enables or disables the trust region. Default: enabled.
    #[must_use]
    pub fn use_trust_region(mut self, enabled: bool) -> Self {
        self.use_trust_region = enabled;
        self
    }
}

impl<F: Features> Default for GpBanditAcquisitionBuilder<F> {
    fn default() -> Self {
        Self::new(Ucb::default())
    }
}

impl<F: Features> core::fmt::Debug for GpBanditAcquisitionBuilder<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GpBanditAcquisitionBuilder")
            .field("use_trust_region", &self.use_trust_region)
            .field("built", &self.built.is_some())
            .finish_non_exhaustive()
    }
}

impl<F: Features> AcquisitionBuilder<F> for GpBanditAcquisitionBuilder<F> {
    type Output = DVector<f64>;

    fn build<M>(
        &mut self,
        problem: &ProblemStatement,
        model: Arc<M>,
        ensemble: Vec<M::Params>,
        features: F,
        labels: DVector<f64>,
        converter: &dyn ArrayConverter,
        options: BuildOptions,
    ) -> Result<()>
    where
        M: SurrogateModel<F> + 'static,
    {
        check_labels(&features, &labels)?;
        let ensemble_size = ensemble.len();
        let features = Arc::new(features);
        let labels = Arc::new(labels);
        let dist_fn = predictive_distribution(
            model,
            ensemble,
            Arc::clone(&features),
            Arc::clone(&labels),
            options.observations_is_missing.clone().map(Arc::from),
            options.use_vmap,
        )?;

        let trust_region = if self.use_trust_region {
            Some(Arc::clone(&features).trust_region(
                converter.output_specs(),
                options.feature_is_missing,
                options.observations_is_missing,
            )?)
        } else {
            None
        };
        let trust_radius = trust_region.as_ref().map(|tr| tr.trust_radius());

        let acquisition: AcquisitionFn<F, DVector<f64>> = {
            let dist_fn = Arc::clone(&dist_fn);
            let acquisition_fn = Arc::clone(&self.acquisition_fn);
            Arc::new(move |xs: &F| {
                let dist = dist_fn(xs)?;
                let observed: &dyn Features = features.as_ref();
                let mut scores =
                    acquisition_fn.evaluate(dist.as_ref(), Some(observed), Some(labels.as_ref()))?;
                if let Some((radius, distance)) = gating_distances(trust_region.as_ref(), xs)? {
                    for (score, d) in scores.iter_mut().zip(distance.iter()) {
                        if *d > radius {
                            *score = TRUST_REGION_PENALTY - d;
                        }
                    }
                }
                Ok(scores)
            })
        };

        trace_info!(
            trust_radius,
            ensemble_size,
            num_acquisitions = 1,
            "acquisition built"
        );

        self.built = Some(Built {
            problem: problem.with_acquisition_metrics([ACQUISITION_METRIC]),
            trust_radius,
            predict: predict_fn(&dist_fn),
            acquisition,
            sample: sample_fn(&dist_fn),
        });
        Ok(())
    }

    fn metadata(&self) -> Result<BTreeMap<String, f64>> {
        Ok(built(self.built.as_ref())?.metadata())
    }

    fn acquisition_problem(&self) -> Result<&ProblemStatement> {
        Ok(&built(self.built.as_ref())?.problem)
    }

    fn acquisition_on_array(&self) -> Result<AcquisitionFn<F, DVector<f64>>> {
        Ok(Arc::clone(&built(self.built.as_ref())?.acquisition))
    }

    fn predict_on_array(&self) -> Result<PredictFn<F>> {
        Ok(Arc::clone(&built(self.built.as_ref())?.predict))
    }

    fn sample_on_array(&self) -> Result<SampleFn<F>> {
        Ok(Arc::clone(&built(self.built.as_ref())?.sample))
    }
}

// ---------------------------------------------------------------------------
// Multiple acquisitions
// ---------------------------------------------------------------------------

/// Builder for several named acquisition functions sharing one predictive
/// distribution.
///
/// The acquisition callable returns a `(num_functions, M)` matrix, one row
/// per name in insertion order. Padding masks are not supported and are
/// ignored; a trust region over continuous-and-categorical features is
/// rejected at build time.
pub struct GpBanditMultiAcquisitionBuilder<F: Features> {
    acquisition_fns: Arc<MultiAcquisition>,
    use_trust_region: bool,
    built: Option<Built<F, DMatrix<f64>>>,
}

impl<F: Features> GpBanditMultiAcquisitionBuilder<F> {
    /// Creates a builder with a trust region.
    #[must_use]
    pub fn new(acquisition_fns: MultiAcquisition) -> Self {
        Self {
            acquisition_fns: Arc::new(acquisition_fns),
            use_trust_region: true,
            built: None,
        }
    }

    /// Enables or disables the trust region. Default: enabled.
    #[must_use]
    pub fn use_trust_region(mut self, enabled: bool) -> Self {
        self.use_trust_region = enabled;
        self
    }
}

impl<F: Features> core::fmt::Debug for GpBanditMultiAcquisitionBuilder<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GpBanditMultiAcquisitionBuilder")
            .field("acquisition_fns", &self.acquisition_fns)
            .field("use_trust_region", &self.use_trust_region)
            .field("built", &self.built.is_some())
            .finish()
    }
}

impl<F: Features> AcquisitionBuilder<F> for GpBanditMultiAcquisitionBuilder<F> {
    type Output = DMatrix<f64>;

    fn build<M>(
        &mut self,
        problem: &ProblemStatement,
        model: Arc<M>,
        ensemble: Vec<M::Params>,
        features: F,
        labels: DVector<f64>,
        converter: &dyn ArrayConverter,
        options: BuildOptions,
    ) -> Result<()>
    where
        M: SurrogateModel<F> + 'static,
    {
        if self.acquisition_fns.is_empty() {
            return Err(Error::InvalidConfiguration(
                "at least one acquisition function is required".into(),
            ));
        }
        if self.use_trust_region
            && features.representation() == FeatureRepresentation::ContinuousAndCategorical
        {
            return Err(Error::UnsupportedConfiguration(
                "multi-acquisition trust region does not support continuous and categorical \
                 features"
                    .into(),
            ));
        }
        check_labels(&features, &labels)?;
        let ensemble_size = ensemble.len();
        let features = Arc::new(features);
        let labels = Arc::new(labels);
        let dist_fn = predictive_distribution(
            model,
            ensemble,
            Arc::clone(&features),
            Arc::clone(&labels),
            None,
            options.use_vmap,
        )?;

        let trust_region = if self.use_trust_region {
            Some(Arc::clone(&features).trust_region(converter.output_specs(), None, None)?)
        } else {
            None
        };
        let trust_radius = trust_region.as_ref().map(|tr| tr.trust_radius());

        let acquisition: AcquisitionFn<F, DMatrix<f64>> = {
            let dist_fn = Arc::clone(&dist_fn);
            let acquisition_fns = Arc::clone(&self.acquisition_fns);
            Arc::new(move |xs: &F| {
                let dist = dist_fn(xs)?;
                let observed: &dyn Features = features.as_ref();
                let mut scores =
                    acquisition_fns.evaluate(dist.as_ref(), Some(observed), Some(labels.as_ref()))?;
                if let Some((radius, distance)) = gating_distances(trust_region.as_ref(), xs)? {
                    for (col, d) in distance.iter().enumerate() {
                        if *d > radius {
                            scores.column_mut(col).fill(TRUST_REGION_PENALTY - d);
                        }
                    }
                }
                Ok(scores)
            })
        };

        trace_info!(
            trust_radius,
            ensemble_size,
            num_acquisitions = self.acquisition_fns.len(),
            "multi-acquisition built"
        );

        self.built = Some(Built {
            problem: problem.with_acquisition_metrics(self.acquisition_fns.names()),
            trust_radius,
            predict: predict_fn(&dist_fn),
            acquisition,
            sample: sample_fn(&dist_fn),
        });
        Ok(())
    }

    fn metadata(&self) -> Result<BTreeMap<String, f64>> {
        Ok(built(self.built.as_ref())?.metadata())
    }

    fn acquisition_problem(&self) -> Result<&ProblemStatement> {
        Ok(&built(self.built.as_ref())?.problem)
    }

    fn acquisition_on_array(&self) -> Result<AcquisitionFn<F, DMatrix<f64>>> {
        Ok(Arc::clone(&built(self.built.as_ref())?.acquisition))
    }

    fn predict_on_array(&self) -> Result<PredictFn<F>> {
        Ok(Arc::clone(&built(self.built.as_ref())?.predict))
    }

    fn sample_on_array(&self) -> Result<SampleFn<F>> {
        Ok(Arc::clone(&built(self.built.as_ref())?.sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::TrialToArrayConverter;
    use crate::distribution::Normal;
    use crate::problem::{MetricInformation, SearchSpace};
    use crate::types::ObjectiveMetricGoal;

    /// Predicts `mean = offset + sum(x)` and `stddev = 1` independently of the
    /// data; the ensemble member is the offset.
    #[derive(Debug)]
    struct LinearModel;

    impl SurrogateModel<DMatrix<f64>> for LinearModel {
        type Params = f64;

        fn posterior_predictive(
            &self,
            params: &f64,
            xs: &DMatrix<f64>,
            _features: &DMatrix<f64>,
            _labels: &DVector<f64>,
            _observations_is_missing: Option<&[bool]>,
        ) -> Result<Box<dyn Distribution>> {
            let mean = DVector::from_fn(xs.nrows(), |i, _| params + xs.row(i).sum());
            Ok(Box::new(Normal::new(mean, DVector::from_element(xs.nrows(), 1.0))?))
        }
    }

    fn setup() -> (ProblemStatement, TrialToArrayConverter, DMatrix<f64>, DVector<f64>) {
        let problem = ProblemStatement::new(
            SearchSpace::new().add_float("x", 0.0, 1.0).add_float("y", 0.0, 1.0),
        )
        .with_metric(MetricInformation::minimize("loss"));
        let converter = TrialToArrayConverter::from_problem(&problem).unwrap();
        let features = DMatrix::from_row_slice(2, 2, &[0.1, 0.1, 0.2, 0.2]);
        let labels = DVector::from_vec(vec![0.0, 1.0]);
        (problem, converter, features, labels)
    }

    #[test]
    fn accessors_fail_before_build() {
        let b = GpBanditAcquisitionBuilder::<DMatrix<f64>>::default();
        assert!(matches!(b.metadata(), Err(Error::NotBuilt)));
        assert!(matches!(b.acquisition_problem(), Err(Error::NotBuilt)));
        assert!(b.acquisition_on_array().is_err());
        assert!(b.predict_on_array().is_err());
        assert!(b.sample_on_array().is_err());
    }

    #[test]
    fn mixture_of_ensemble_members() {
        let (problem, converter, features, labels) = setup();
        let mut b = GpBanditAcquisitionBuilder::new(Ucb::new(0.0)).use_trust_region(false);
        b.build(
            &problem,
            Arc::new(LinearModel),
            vec![0.0, 2.0],
            features,
            labels,
            &converter,
            BuildOptions::default(),
        )
        .unwrap();

        let xs = DMatrix::from_row_slice(1, 2, &[0.25, 0.25]);
        let p = b.predict_on_array().unwrap()(&xs).unwrap();
        assert!((p.mean[0] - 1.5).abs() < 1e-12);
        // Var = 1 + E[mu^2] - mean^2 = 1 + (0.25 + 6.25) / 2 - 2.25 = 2.0
        assert!((p.stddev[0] - 2.0_f64.sqrt()).abs() < 1e-12);
        assert!(b.metadata().unwrap().is_empty());

        let problem_out = b.acquisition_problem().unwrap();
        assert_eq!(problem_out.metric_information.len(), 1);
        assert_eq!(problem_out.metric_information[0].name, ACQUISITION_METRIC);
        assert_eq!(problem_out.metric_information[0].goal, ObjectiveMetricGoal::Maximize);
        assert_eq!(problem.metric_information[0].name, "loss");
    }

    #[test]
    fn trust_region_penalizes_far_points() {
        let (problem, converter, features, labels) = setup();
        let mut b = GpBanditAcquisitionBuilder::new(Ucb::default());
        b.build(
            &problem,
            Arc::new(LinearModel),
            vec![0.0],
            features,
            labels,
            &converter,
            BuildOptions::default(),
        )
        .unwrap();
        let radius = b.metadata().unwrap()["trust_radius"];
        // 2 / (5 * 3) = 0.1333
        assert!((radius - (0.2 + 0.3 * 2.0 / 15.0)).abs() < 1e-12);

        let xs = DMatrix::from_row_slice(2, 2, &[0.15, 0.15, 0.9, 0.9]);
        let scores = b.acquisition_on_array().unwrap()(&xs).unwrap();
        assert!(scores[0] > 0.0);
        assert!((scores[1] - (TRUST_REGION_PENALTY - 0.7)).abs() < 1e-3);
    }

    #[test]
    fn feature_mask_gates_trust_region_only() {
        let (problem, converter, features, labels) = setup();
        let xs = DMatrix::from_row_slice(1, 2, &[0.15, 0.9]);
        let scores_with = |options: BuildOptions| {
            let mut b = GpBanditAcquisitionBuilder::new(Ucb::default());
            b.build(
                &problem,
                Arc::new(LinearModel),
                vec![0.0],
                features.clone(),
                labels.clone(),
                &converter,
                options,
            )
            .unwrap();
            let mean = b.predict_on_array().unwrap()(&xs).unwrap().mean[0];
            (b.acquisition_on_array().unwrap()(&xs).unwrap()[0], mean)
        };

        let (unmasked, mean) = scores_with(BuildOptions::default());
        assert!(unmasked < TRUST_REGION_PENALTY / 2.0);
        assert!((mean - 1.05).abs() < 1e-12);

        let (masked, mean) =
            scores_with(BuildOptions::default().feature_is_missing(vec![false, true]));
        assert!(masked > 0.0);
        // The model still sees the masked column.
        assert!((mean - 1.05).abs() < 1e-12);
    }

    #[test]
    fn empty_ensemble_and_label_mismatch() {
        let (problem, converter, features, labels) = setup();
        let mut b = GpBanditAcquisitionBuilder::new(Ucb::default());
        assert!(matches!(
            b.build(
                &problem,
                Arc::new(LinearModel),
                vec![],
                features.clone(),
                labels,
                &converter,
                BuildOptions::default(),
            ),
            Err(Error::EmptyEnsemble)
        ));
        assert!(matches!(
            b.build(
                &problem,
                Arc::new(LinearModel),
                vec![0.0],
                features,
                DVector::zeros(3),
                &converter,
                BuildOptions::default(),
            ),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn without_vmap_requires_single_member() {
        let (problem, converter, features, labels) = setup();
        let mut b = GpBanditAcquisitionBuilder::new(Ucb::default());
        let options = BuildOptions::default().use_vmap(false);
        assert!(
            b.build(
                &problem,
                Arc::new(LinearModel),
                vec![0.0, 1.0],
                features.clone(),
                labels.clone(),
                &converter,
                options.clone(),
            )
            .is_err()
        );
        b.build(
            &problem,
            Arc::new(LinearModel),
            vec![1.0],
            features,
            labels,
            &converter,
            options,
        )
        .unwrap();
        let xs = DMatrix::from_row_slice(1, 2, &[0.1, 0.1]);
        let p = b.predict_on_array().unwrap()(&xs).unwrap();
        assert!((p.mean[0] - 1.2).abs() < 1e-12);
        assert_eq!(p.stddev[0], 1.0);
    }

    #[test]
    fn samples_have_requested_shape() {
        let (problem, converter, features, labels) = setup();
        let mut b = GpBanditAcquisitionBuilder::new(Ucb::default());
        b.build(
            &problem,
            Arc::new(LinearModel),
            vec![0.0, 1.0],
            features,
            labels,
            &converter,
            BuildOptions::default(),
        )
        .unwrap();
        let sample = b.sample_on_array().unwrap();
        let xs = DMatrix::from_element(4, 2, 0.1);
        let a = sample(&xs, 7, 3).unwrap();
        assert_eq!(a.shape(), (7, 4));
        assert_eq!(a, sample(&xs, 7, 3).unwrap());
    }

    #[test]
    fn multi_builder_stacks_and_names_metrics() {
        let (problem, converter, features, labels) = setup();
        let fns = MultiAcquisition::new()
            .with("ucb", Ucb::new(1.0))
            .with("mean", Ucb::new(0.0));
        let mut b = GpBanditMultiAcquisitionBuilder::new(fns);
        b.build(
            &problem,
            Arc::new(LinearModel),
            vec![0.0],
            features,
            labels,
            &converter,
            BuildOptions::default(),
        )
        .unwrap();
        let names: Vec<_> = b
            .acquisition_problem()
            .unwrap()
            .metric_information
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(names, vec!["ucb", "mean"]);

        let xs = DMatrix::from_row_slice(2, 2, &[0.1, 0.1, 0.9, 0.9]);
        let scores = b.acquisition_on_array().unwrap()(&xs).unwrap();
        assert_eq!(scores.shape(), (2, 2));
        assert!((scores[(0, 0)] - 1.2).abs() < 1e-12);
        assert!((scores[(1, 0)] - 0.2).abs() < 1e-12);
        assert!(scores.column(1).iter().all(|s| *s < -1e11));
    }

    #[test]
    fn multi_builder_rejects_categorical_trust_region() {
        #[derive(Debug)]
        struct Flat;
        impl SurrogateModel<crate::ContinuousAndCategorical> for Flat {
            type Params = ();
            fn posterior_predictive(
                &self,
                _params: &(),
                xs: &crate::ContinuousAndCategorical,
                _features: &crate::ContinuousAndCategorical,
                _labels: &DVector<f64>,
                _observations_is_missing: Option<&[bool]>,
            ) -> Result<Box<dyn Distribution>> {
                let m = xs.num_rows();
                Ok(Box::new(Normal::new(DVector::zeros(m), DVector::from_element(m, 1.0))?))
            }
        }

        let (problem, converter, _, labels) = setup();
        let features = crate::ContinuousAndCategorical::new(
            DMatrix::zeros(2, 1),
            DMatrix::zeros(2, 1),
        )
        .unwrap();
        let mut b = GpBanditMultiAcquisitionBuilder::new(
            MultiAcquisition::new().with("ucb", Ucb::default()),
        );
        assert!(matches!(
            b.build(
                &problem,
                Arc::new(Flat),
                vec![()],
                features.clone(),
                labels.clone(),
                &converter,
                BuildOptions::default(),
            ),
            Err(Error::UnsupportedConfiguration(_))
        ));

        let mut b = b.use_trust_region(false);
        b.build(
            &problem,
            Arc::new(Flat),
            vec![()],
            features,
            labels,
            &converter,
            BuildOptions::default(),
        )
        .unwrap();
        assert!(b.metadata().unwrap().is_empty());
    }
}
