//! Vectorized ask/evaluate/tell optimization of array score functions.
//!
//! A [`VectorizedOptimizer`] repeatedly asks a [`VectorizedStrategy`] for a
//! batch of candidate rows, scores the batch with a caller-supplied function
//! and tells the strategy the rewards. It keeps the `count` best rows seen
//! and finally converts them back to [`Trial`]s with the converter.
//!
//! The run is fully determined by the configuration and one `u64` seed: the
//! seed is split into an initialization seed and a loop seed, and every step
//! splits its seed into (suggest, update, next-step) seeds.
//!
//! # Strategies
//!
//! | Strategy | Factory | Description |
//! |----------|---------|-------------|
//! | [`RandomStrategy`] | [`RandomStrategyFactory`] | Uniform random rows; one hot entry per categorical block |
//! | [`DifferentialEvolution`] | [`DifferentialEvolutionFactory`] | Population-based DE with greedy per-slot selection |
//!
//! # Examples
//!
//! ```
//! use acqopt::optimizer::{DifferentialEvolutionFactory, VectorizedOptimizer};
//! use acqopt::prelude::*;
//! use nalgebra::{DMatrix, DVector};
//!
//! let problem = ProblemStatement::new(SearchSpace::new().add_float("x", -5.0, 5.0));
//! let converter = TrialToArrayConverter::from_problem(&problem).unwrap();
//!
//! let optimizer = VectorizedOptimizer::builder(DifferentialEvolutionFactory::default())
//!     .suggestion_batch_size(10)
//!     .max_evaluations(500)
//!     .build();
//!
//! // Feature 0.5 maps to x = 0.
//! let score = |xs: &DMatrix<f64>| -> acqopt::Result<DVector<f64>> {
//!     Ok(DVector::from_fn(xs.nrows(), |i, _| -(xs[(i, 0)] - 0.5).abs()))
//! };
//! let (trials, summary) = optimizer
//!     .optimize_with_summary(&converter, &score, 1, None, Some(1))
//!     .unwrap();
//! assert_eq!(summary.evaluations, 500);
//! assert!(trials[0].metric("acquisition").unwrap() > -0.05);
//! ```

mod de;
mod layout;
mod random;

use core::cmp::Ordering;
use core::fmt::Debug;
use std::time::{Duration, Instant};

use nalgebra::{DMatrix, DVector};

use crate::builder::ACQUISITION_METRIC;
use crate::converter::ArrayConverter;
use crate::error::{Error, Result};
use crate::rng_util;
use crate::trial::{Measurement, Trial};

pub use de::{
    DEStrategy, DifferentialEvolution, DifferentialEvolutionFactory,
    DifferentialEvolutionFactoryBuilder, DifferentialEvolutionState,
};
pub use random::{RandomStrategy, RandomStrategyFactory};

/// Default number of rows per `suggest` call.
pub const DEFAULT_SUGGESTION_BATCH_SIZE: usize = 25;
/// Default evaluation budget.
pub const DEFAULT_MAX_EVALUATIONS: usize = 75_000;

/// A pure search policy driven by the optimizer.
///
/// Implementations never mutate themselves; all progress lives in
/// [`VectorizedStrategy::State`], which is passed in and returned by value.
pub trait VectorizedStrategy {
    /// Search state threaded through the loop.
    type State: Clone + Debug;

    /// Creates the initial state, optionally warm-started from scored prior
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the prior arrays disagree in
    /// shape.
    fn init_state(
        &self,
        seed: u64,
        prior_features: Option<&DMatrix<f64>>,
        prior_rewards: Option<&DVector<f64>>,
    ) -> Result<Self::State>;

    /// Proposes exactly [`suggestion_batch_size`](Self::suggestion_batch_size)
    /// rows.
    ///
    /// # Errors
    ///
    /// Strategy specific.
    fn suggest(&self, state: &Self::State, seed: u64) -> Result<DMatrix<f64>>;

    /// Number of rows returned by every `suggest` call.
    fn suggestion_batch_size(&self) -> usize;

    /// Returns the state after observing the rewards of a suggested batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the batch does not match the
    /// strategy's shape.
    fn update(
        &self,
        state: &Self::State,
        batch_features: &DMatrix<f64>,
        batch_rewards: &DVector<f64>,
        seed: u64,
    ) -> Result<Self::State>;
}

/// Creates a fresh strategy for each optimizer run.
pub trait VectorizedStrategyFactory {
    /// The strategy produced.
    type Strategy: VectorizedStrategy;

    /// Builds a strategy for the converter's column layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for unusable settings.
    fn create(
        &self,
        converter: &dyn ArrayConverter,
        suggestion_batch_size: usize,
    ) -> Result<Self::Strategy>;
}

fn reward_key(r: f64) -> f64 {
    if r.is_nan() { f64::NEG_INFINITY } else { r }
}

/// Best first: higher reward, then filled before empty.
fn rank_cmp((ra, fa): (f64, bool), (rb, fb): (f64, bool)) -> Ordering {
    reward_key(rb).total_cmp(&reward_key(ra)).then_with(|| fb.cmp(&fa))
}

/// The best `count` rows seen so far.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorizedStrategyResults {
    /// `(count, D)` feature rows.
    pub features: DMatrix<f64>,
    /// `(count,)` rewards; `-inf` for empty slots.
    pub rewards: DVector<f64>,
    /// Number of rows folded in so far.
    pub num_seen: usize,
    /// `(count,)` flags; `true` once a slot holds an evaluated row.
    pub filled: Vec<bool>,
}

impl VectorizedStrategyResults {
    /// An empty pool of `count` rows with `num_features` columns.
    #[must_use]
    pub fn new(count: usize, num_features: usize) -> Self {
        Self {
            features: DMatrix::zeros(count, num_features),
            rewards: DVector::from_element(count, f64::NEG_INFINITY),
            num_seen: 0,
            filled: vec![false; count],
        }
    }

    /// Capacity of the pool.
    #[must_use]
    pub fn count(&self) -> usize {
        self.rewards.len()
    }

    /// Folds a batch into the pool, keeping the `count` largest rewards.
    ///
    /// NaN rewards rank below every other value. On equal rewards an
    /// evaluated row wins over an empty slot.
    #[must_use]
    pub fn update(self, batch_features: &DMatrix<f64>, batch_rewards: &DVector<f64>) -> Self {
        let count = self.count();
        let batch = batch_rewards.len();
        let reward_of = |i: usize| {
            if i < batch {
                batch_rewards[i]
            } else {
                self.rewards[i - batch]
            }
        };
        let filled_of = |i: usize| i < batch || self.filled[i - batch];

        let mut order: Vec<usize> = (0..batch + count).collect();
        if count > 0 && order.len() > count {
            order.select_nth_unstable_by(count - 1, |&a, &b| {
                rank_cmp((reward_of(a), filled_of(a)), (reward_of(b), filled_of(b)))
            });
        }
        order.truncate(count);

        let rewards = DVector::from_fn(count, |k, _| reward_of(order[k]));
        let features = DMatrix::from_fn(count, self.features.ncols(), |k, j| {
            let i = order[k];
            if i < batch {
                batch_features[(i, j)]
            } else {
                self.features[(i - batch, j)]
            }
        });
        let filled = order.iter().map(|&i| filled_of(i)).collect();
        Self {
            features,
            rewards,
            num_seen: self.num_seen + batch,
            filled,
        }
    }

    /// Pool row indices of the filled slots, best first.
    fn ranked(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.count()).filter(|&i| self.filled[i]).collect();
        order.sort_by(|&a, &b| reward_key(self.rewards[b]).total_cmp(&reward_key(self.rewards[a])));
        order
    }

    /// Best reward seen, if any row was folded in.
    #[must_use]
    pub fn best_reward(&self) -> Option<f64> {
        self.ranked().first().map(|&i| self.rewards[i])
    }
}

/// Outcome statistics of one [`VectorizedOptimizer`] run.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationSummary {
    /// Score-function evaluations performed in the loop.
    pub evaluations: usize,
    /// Number of ask/tell steps.
    pub num_steps: usize,
    /// Wall-clock time of the whole call.
    pub duration: Duration,
    /// Best reward seen, if any.
    pub best_reward: Option<f64>,
}

/// Loop carry: strategy state, pool and the next step's seed.
type Carry<S> = (S, VectorizedStrategyResults, u64);

/// Runs a vectorized strategy against an array score function.
///
/// Stateless across calls: every [`optimize`](Self::optimize) creates a new
/// strategy from the factory.
#[derive(Clone, Debug)]
pub struct VectorizedOptimizer<Fac> {
    strategy_factory: Fac,
    suggestion_batch_size: usize,
    max_evaluations: usize,
    jit_loop: bool,
    max_duration: Option<Duration>,
}

impl<Fac: VectorizedStrategyFactory> VectorizedOptimizer<Fac> {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn builder(strategy_factory: Fac) -> VectorizedOptimizerBuilder<Fac> {
        VectorizedOptimizerBuilder::new(strategy_factory)
    }

    /// Rows per step.
    #[must_use]
    pub fn suggestion_batch_size(&self) -> usize {
        self.suggestion_batch_size
    }

    /// Evaluation budget.
    #[must_use]
    pub fn max_evaluations(&self) -> usize {
        self.max_evaluations
    }

    /// Number of steps a run performs.
    #[must_use]
    pub fn num_steps(&self) -> usize {
        self.max_evaluations
            .checked_div(self.suggestion_batch_size)
            .unwrap_or(0)
    }

    /// Returns the `count` best trials found, best first.
    ///
    /// Each trial is completed with the measurement
    /// `acquisition = reward`. Fewer than `count` trials are returned only
    /// when fewer rows than `count` were evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for a zero `count` or batch
    /// size, [`Error::DimensionMismatch`] when the strategy or the score
    /// function return arrays of the wrong shape, and any error raised by
    /// the score function or the converter.
    pub fn optimize<S>(
        &self,
        converter: &dyn ArrayConverter,
        score_fn: &S,
        count: usize,
        prior_trials: Option<&[Trial]>,
        seed: Option<u64>,
    ) -> Result<Vec<Trial>>
    where
        S: Fn(&DMatrix<f64>) -> Result<DVector<f64>> + ?Sized,
    {
        self.optimize_with_summary(converter, score_fn, count, prior_trials, seed)
            .map(|(trials, _)| trials)
    }

    /// Like [`optimize`](Self::optimize), also returning run statistics.
    ///
    /// # Errors
    ///
    /// See [`optimize`](Self::optimize).
    pub fn optimize_with_summary<S>(
        &self,
        converter: &dyn ArrayConverter,
        score_fn: &S,
        count: usize,
        prior_trials: Option<&[Trial]>,
        seed: Option<u64>,
    ) -> Result<(Vec<Trial>, OptimizationSummary)>
    where
        S: Fn(&DMatrix<f64>) -> Result<DVector<f64>> + ?Sized,
    {
        if count == 0 {
            return Err(Error::InvalidConfiguration("count must be at least 1".into()));
        }
        if self.suggestion_batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "suggestion_batch_size must be at least 1".into(),
            ));
        }

        let start = Instant::now();
        let num_features = converter.num_features();
        let dimension_is_missing = if converter.is_padded() {
            converter.dimension_is_missing()
        } else {
            None
        };

        let (prior_features, prior_rewards) = match prior_trials {
            Some(trials) if !trials.is_empty() => {
                let (features, rewards) = score_prior_trials(converter, score_fn, trials)?;
                (Some(features), Some(rewards))
            }
            _ => (None, None),
        };

        let strategy = self
            .strategy_factory
            .create(converter, self.suggestion_batch_size)?;

        let [init_seed, loop_seed] = rng_util::split_seed::<2>(seed.unwrap_or(0));
        let init_state =
            strategy.init_state(init_seed, prior_features.as_ref(), prior_rewards.as_ref())?;
        let carry: Carry<_> = (
            init_state,
            VectorizedStrategyResults::new(count, num_features),
            loop_seed,
        );

        let step = |carry: Carry<_>| {
            optimization_step(
                &strategy,
                score_fn,
                num_features,
                dimension_is_missing.as_deref(),
                carry,
            )
        };

        let num_steps = self.num_steps();
        let (_, best_results, _) = if self.jit_loop {
            (0..num_steps).try_fold(carry, |carry, _| step(carry))?
        } else {
            let mut carry = carry;
            for _ in 0..num_steps {
                carry = step(carry)?;
            }
            carry
        };

        let trials = best_candidates(&best_results, converter)?;
        let summary = OptimizationSummary {
            evaluations: num_steps * self.suggestion_batch_size,
            num_steps,
            duration: start.elapsed(),
            best_reward: best_results.best_reward(),
        };

        trace_info!(
            duration = ?summary.duration,
            evaluations = summary.evaluations,
            best_reward = ?summary.best_reward,
            "optimization completed"
        );
        if let Some(limit) = self.max_duration
            && summary.duration > limit
        {
            trace_debug!(
                duration = ?summary.duration,
                limit = ?limit,
                "optimization exceeded max_duration"
            );
        }

        Ok((trials, summary))
    }
}

/// Converts, pads and scores prior trials in creation order.
fn score_prior_trials<S>(
    converter: &dyn ArrayConverter,
    score_fn: &S,
    trials: &[Trial],
) -> Result<(DMatrix<f64>, DVector<f64>)>
where
    S: Fn(&DMatrix<f64>) -> Result<DVector<f64>> + ?Sized,
{
    let mut ordered: Vec<&Trial> = trials.iter().collect();
    ordered.sort_by_key(|t| t.creation_time);
    let ordered: Vec<Trial> = ordered.into_iter().cloned().collect();

    let mut features = converter.to_features(&ordered)?;
    if converter.is_padded() {
        for i in ordered.len()..features.nrows() {
            features.row_mut(i).fill(0.0);
        }
    }
    let rewards = score_fn(&features)?;
    check_len("prior rewards", features.nrows(), rewards.len())?;
    Ok((features, rewards))
}

fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what,
            expected,
            got,
        })
    }
}

/// One ask/evaluate/tell step; pure in its inputs.
fn optimization_step<St, S>(
    strategy: &St,
    score_fn: &S,
    num_features: usize,
    dimension_is_missing: Option<&[bool]>,
    (state, best_results, seed): Carry<St::State>,
) -> Result<Carry<St::State>>
where
    St: VectorizedStrategy,
    S: Fn(&DMatrix<f64>) -> Result<DVector<f64>> + ?Sized,
{
    let [suggest_seed, update_seed, new_seed] = rng_util::split_seed::<3>(seed);

    let mut new_features = strategy.suggest(&state, suggest_seed)?;
    check_len(
        "suggested rows",
        strategy.suggestion_batch_size(),
        new_features.nrows(),
    )?;
    check_len("suggested columns", num_features, new_features.ncols())?;
    if let Some(mask) = dimension_is_missing {
        for (j, _) in mask.iter().enumerate().filter(|(_, missing)| **missing) {
            new_features.column_mut(j).fill(0.0);
        }
    }

    let new_rewards = score_fn(&new_features)?;
    check_len("rewards", new_features.nrows(), new_rewards.len())?;

    let new_state = strategy.update(&state, &new_features, &new_rewards, update_seed)?;
    trace_debug!(
        batch_best = new_rewards.iter().copied().map(reward_key).fold(f64::NEG_INFINITY, f64::max),
        "optimizer step"
    );
    let new_best = best_results.update(&new_features, &new_rewards);
    Ok((new_state, new_best, new_seed))
}

/// Converts the pool to completed trials, best first.
fn best_candidates(
    best_results: &VectorizedStrategyResults,
    converter: &dyn ArrayConverter,
) -> Result<Vec<Trial>> {
    let ranked = best_results.ranked();
    if ranked.is_empty() {
        return Ok(Vec::new());
    }
    let rows = DMatrix::from_fn(ranked.len(), best_results.features.ncols(), |k, j| {
        best_results.features[(ranked[k], j)]
    });
    let parameters = converter.to_parameters(&rows)?;
    Ok(parameters
        .into_iter()
        .zip(&ranked)
        .map(|(params, &i)| {
            let mut trial = Trial::new(params);
            trial.complete(
                Measurement::new().with_metric(ACQUISITION_METRIC, best_results.rewards[i]),
            );
            trial
        })
        .collect())
}

/// Builder for [`VectorizedOptimizer`].
#[derive(Clone, Debug)]
pub struct VectorizedOptimizerBuilder<Fac> {
    strategy_factory: Fac,
    suggestion_batch_size: usize,
    max_evaluations: usize,
    jit_loop: bool,
    max_duration: Option<Duration>,
}

impl<Fac: VectorizedStrategyFactory> VectorizedOptimizerBuilder<Fac> {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new(strategy_factory: Fac) -> Self {
        Self {
            strategy_factory,
            suggestion_batch_size: DEFAULT_SUGGESTION_BATCH_SIZE,
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
            jit_loop: true,
            max_duration: None,
        }
    }

    /// Rows requested per step.
    ///
    /// Default: 25.
    #[must_use]
    pub fn suggestion_batch_size(mut self, n: usize) -> Self {
        self.suggestion_batch_size = n;
        self
    }

    /// Evaluation budget; the loop runs `max_evaluations / batch` steps.
    ///
    /// Default: 75 000.
    #[must_use]
    pub fn max_evaluations(mut self, n: usize) -> Self {
        self.max_evaluations = n;
        self
    }

    /// Run the loop as a single fold (`true`) or as an explicit loop
    /// (`false`). Both produce identical results.
    ///
    /// Default: `true`.
    #[must_use]
    pub fn jit_loop(mut self, enabled: bool) -> Self {
        self.jit_loop = enabled;
        self
    }

    /// Time budget. Only reported after the run; the loop always performs
    /// its full trip count.
    #[must_use]
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Builds the optimizer.
    #[must_use]
    pub fn build(self) -> VectorizedOptimizer<Fac> {
        VectorizedOptimizer {
            strategy_factory: self.strategy_factory,
            suggestion_batch_size: self.suggestion_batch_size,
            max_evaluations: self.max_evaluations,
            jit_loop: self.jit_loop,
            max_duration: self.max_duration,
        }
    }
}

/// Creates optimizers that share one strategy factory.
#[derive(Clone, Debug, Default)]
pub struct VectorizedOptimizerFactory<Fac> {
    strategy_factory: Fac,
}

impl<Fac: VectorizedStrategyFactory + Clone> VectorizedOptimizerFactory<Fac> {
    /// Wraps a strategy factory.
    #[must_use]
    pub fn new(strategy_factory: Fac) -> Self {
        Self { strategy_factory }
    }

    /// An optimizer with the given batch size and evaluation budget.
    #[must_use]
    pub fn create(
        &self,
        suggestion_batch_size: usize,
        max_evaluations: usize,
    ) -> VectorizedOptimizer<Fac> {
        VectorizedOptimizer::builder(self.strategy_factory.clone())
            .suggestion_batch_size(suggestion_batch_size)
            .max_evaluations(max_evaluations)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(values.len(), 1, |i, _| values[i])
    }

    #[test]
    fn pool_keeps_top_count() {
        let pool = VectorizedStrategyResults::new(3, 1);
        let pool = pool.update(&rows(&[0.1, 0.5, 0.3]), &DVector::from_vec(vec![1.0, 5.0, 3.0]));
        let pool = pool.update(&rows(&[0.2, 0.4]), &DVector::from_vec(vec![2.0, 4.0]));
        let mut kept: Vec<f64> = pool.rewards.iter().copied().collect();
        kept.sort_by(f64::total_cmp);
        assert_eq!(kept, vec![3.0, 4.0, 5.0]);
        assert_eq!(pool.num_seen, 5);
        for (i, r) in pool.rewards.iter().enumerate() {
            assert!((pool.features[(i, 0)] * 10.0 - r).abs() < 1e-12);
        }
    }

    #[test]
    fn nan_rewards_rank_last() {
        let pool = VectorizedStrategyResults::new(1, 1)
            .update(&rows(&[0.1, 0.2]), &DVector::from_vec(vec![f64::NAN, -7.0]));
        assert_eq!(pool.rewards[0], -7.0);
    }

    #[test]
    fn ranked_hides_unfilled_slots() {
        let pool = VectorizedStrategyResults::new(4, 1)
            .update(&rows(&[0.1, 0.2]), &DVector::from_vec(vec![1.0, 2.0]));
        assert_eq!(pool.ranked().len(), 2);
        assert_eq!(pool.best_reward(), Some(2.0));
        assert_eq!(VectorizedStrategyResults::new(2, 1).best_reward(), None);
    }

    #[test]
    fn negative_infinity_reward_beats_empty_slot() {
        let pool = VectorizedStrategyResults::new(2, 1)
            .update(&rows(&[0.7]), &DVector::from_vec(vec![f64::NEG_INFINITY]));
        assert_eq!(pool.filled.iter().filter(|&&f| f).count(), 1);
        let ranked = pool.ranked();
        assert_eq!(ranked.len(), 1);
        assert_eq!(pool.features[(ranked[0], 0)], 0.7);
        assert_eq!(pool.best_reward(), Some(f64::NEG_INFINITY));

        let pool = pool.update(&rows(&[0.3]), &DVector::from_vec(vec![f64::NEG_INFINITY]));
        let mut kept: Vec<f64> = pool.ranked().iter().map(|&i| pool.features[(i, 0)]).collect();
        kept.sort_by(f64::total_cmp);
        assert_eq!(kept, vec![0.3, 0.7]);
    }

    #[test]
    fn num_steps_is_integer_division() {
        let opt = VectorizedOptimizer::builder(RandomStrategyFactory)
            .suggestion_batch_size(25)
            .max_evaluations(110)
            .build();
        assert_eq!(opt.num_steps(), 4);
        let factory = VectorizedOptimizerFactory::new(RandomStrategyFactory);
        let opt = factory.create(10, 95);
        assert_eq!(opt.suggestion_batch_size(), 10);
        assert_eq!(opt.max_evaluations(), 95);
        assert_eq!(opt.num_steps(), 9);
    }
}
