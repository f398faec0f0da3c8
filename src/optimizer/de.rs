//! Differential Evolution (DE) as a vectorized strategy.
//!
//! The population has one slot per suggested row. Every step builds one
//! trial vector per slot through **mutation** and **binomial crossover**;
//! after scoring, a trial replaces its slot only if its reward is at least
//! as high as the slot's current reward.
//!
//! Mutation strategies (`F` = mutation factor):
//! - `Rand1`:  `v = x_r1 + F * (x_r2 - x_r3)`
//! - `Best1`:  `v = x_best + F * (x_r1 - x_r2)`
//! - `CurrentToBest1`:  `v = x_i + F * (x_best - x_i) + F * (x_r1 - x_r2)`
//!
//! Trial vectors are projected back onto the feature box: continuous columns
//! are clamped to `[0, 1]` and each one-hot block is snapped to its argmax.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `mutation_factor` (F) | 0.8 | Differential amplification |
//! | `crossover_rate` (CR) | 0.9 | Probability of taking a column from the mutant |
//! | `strategy` | `Rand1` | Mutation strategy (see [`DEStrategy`]) |

use nalgebra::{DMatrix, DVector};

use super::layout::ColumnLayout;
use super::{VectorizedStrategy, VectorizedStrategyFactory, reward_key};
use crate::converter::ArrayConverter;
use crate::error::{Error, Result};

/// Differential Evolution mutation strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DEStrategy {
    /// DE/rand/1: `v = x_r1 + F * (x_r2 - x_r3)`
    ///
    /// The most robust strategy. Uses three random population members.
    #[default]
    Rand1,
    /// DE/best/1: `v = x_best + F * (x_r1 - x_r2)`
    ///
    /// Greedier; biases toward the current best slot.
    Best1,
    /// DE/current-to-best/1: `v = x_i + F * (x_best - x_i) + F * (x_r1 - x_r2)`
    CurrentToBest1,
}

/// Population and per-slot rewards.
#[derive(Clone, Debug, PartialEq)]
pub struct DifferentialEvolutionState {
    /// `(P, D)` population rows.
    pub population: DMatrix<f64>,
    /// `(P,)` reward of each slot; `-inf` until the slot is first scored.
    pub fitness: DVector<f64>,
}

impl DifferentialEvolutionState {
    fn best_index(&self) -> usize {
        let mut best = 0;
        for (i, &f) in self.fitness.iter().enumerate() {
            if f > self.fitness[best] {
                best = i;
            }
        }
        best
    }
}

/// Differential Evolution over the converter's feature box.
#[derive(Clone, Debug)]
pub struct DifferentialEvolution {
    layout: ColumnLayout,
    population_size: usize,
    mutation_factor: f64,
    crossover_rate: f64,
    strategy: DEStrategy,
}

impl DifferentialEvolution {
    /// Mutation factor `F`.
    #[must_use]
    pub fn mutation_factor(&self) -> f64 {
        self.mutation_factor
    }

    /// Crossover rate `CR`.
    #[must_use]
    pub fn crossover_rate(&self) -> f64 {
        self.crossover_rate
    }

    /// Mutation strategy.
    #[must_use]
    pub fn strategy(&self) -> DEStrategy {
        self.strategy
    }

    fn check_shape(&self, features: &DMatrix<f64>, rewards: &DVector<f64>) -> Result<()> {
        if features.nrows() != rewards.len() {
            return Err(Error::DimensionMismatch {
                what: "rewards",
                expected: features.nrows(),
                got: rewards.len(),
            });
        }
        if features.ncols() != self.layout.num_features() {
            return Err(Error::DimensionMismatch {
                what: "feature columns",
                expected: self.layout.num_features(),
                got: features.ncols(),
            });
        }
        Ok(())
    }

    fn mutant(
        &self,
        state: &DifferentialEvolutionState,
        rng: &mut fastrand::Rng,
        target: usize,
        best: usize,
    ) -> Vec<f64> {
        let pop = &state.population;
        let f = self.mutation_factor;
        let n = self.population_size;
        let dim = pop.ncols();

        match self.strategy {
            DEStrategy::Rand1 => {
                let idx = select_random_indices(rng, n, 3, target);
                (0..dim)
                    .map(|j| pop[(idx[0], j)] + f * (pop[(idx[1], j)] - pop[(idx[2], j)]))
                    .collect()
            }
            DEStrategy::Best1 => {
                let idx = select_random_indices(rng, n, 2, target);
                (0..dim)
                    .map(|j| pop[(best, j)] + f * (pop[(idx[0], j)] - pop[(idx[1], j)]))
                    .collect()
            }
            DEStrategy::CurrentToBest1 => {
                let idx = select_random_indices(rng, n, 2, target);
                (0..dim)
                    .map(|j| {
                        pop[(target, j)]
                            + f * (pop[(best, j)] - pop[(target, j)])
                            + f * (pop[(idx[0], j)] - pop[(idx[1], j)])
                    })
                    .collect()
            }
        }
    }
}

/// Picks `count` distinct slots other than `exclude`, falling back to
/// drawing with replacement when the population is too small.
fn select_random_indices(
    rng: &mut fastrand::Rng,
    n: usize,
    count: usize,
    exclude: usize,
) -> Vec<usize> {
    let mut selected = Vec::with_capacity(count);
    if n <= count {
        while selected.len() < count {
            selected.push(rng.usize(0..n));
        }
        return selected;
    }
    while selected.len() < count {
        let idx = rng.usize(0..n);
        if idx != exclude && !selected.contains(&idx) {
            selected.push(idx);
        }
    }
    selected
}

impl VectorizedStrategy for DifferentialEvolution {
    type State = DifferentialEvolutionState;

    fn init_state(
        &self,
        seed: u64,
        prior_features: Option<&DMatrix<f64>>,
        prior_rewards: Option<&DVector<f64>>,
    ) -> Result<DifferentialEvolutionState> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut population = self.layout.sample(&mut rng, self.population_size);
        let mut fitness = DVector::from_element(self.population_size, f64::NEG_INFINITY);

        match (prior_features, prior_rewards) {
            (Some(features), Some(rewards)) => {
                self.check_shape(features, rewards)?;
                let mut order: Vec<usize> = (0..rewards.len()).collect();
                order.sort_by(|&a, &b| reward_key(rewards[b]).total_cmp(&reward_key(rewards[a])));
                for (slot, &i) in order.iter().take(self.population_size).enumerate() {
                    population.row_mut(slot).copy_from(&features.row(i));
                    self.layout.project_row(&mut population, slot);
                    fitness[slot] = reward_key(rewards[i]);
                }
                trace_debug!(
                    warm_started = order.len().min(self.population_size),
                    "differential evolution initialized from prior rows"
                );
            }
            (None, None) => {}
            (features, _) => {
                return Err(Error::DimensionMismatch {
                    what: "prior rewards",
                    expected: features.map_or(0, DMatrix::nrows),
                    got: prior_rewards.map_or(0, DVector::len),
                });
            }
        }

        Ok(DifferentialEvolutionState {
            population,
            fitness,
        })
    }

    fn suggest(&self, state: &DifferentialEvolutionState, seed: u64) -> Result<DMatrix<f64>> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let dim = state.population.ncols();
        let best = state.best_index();
        let mut trials = state.population.clone();

        for i in 0..self.population_size {
            let mutant = self.mutant(state, &mut rng, i, best);
            if dim > 0 {
                let j_rand = rng.usize(0..dim);
                for (j, &v) in mutant.iter().enumerate() {
                    if j == j_rand || rng.f64() < self.crossover_rate {
                        trials[(i, j)] = v;
                    }
                }
            }
            self.layout.project_row(&mut trials, i);
        }
        Ok(trials)
    }

    fn suggestion_batch_size(&self) -> usize {
        self.population_size
    }

    fn update(
        &self,
        state: &DifferentialEvolutionState,
        batch_features: &DMatrix<f64>,
        batch_rewards: &DVector<f64>,
        _seed: u64,
    ) -> Result<DifferentialEvolutionState> {
        self.check_shape(batch_features, batch_rewards)?;
        if batch_rewards.len() != self.population_size {
            return Err(Error::DimensionMismatch {
                what: "batch rows",
                expected: self.population_size,
                got: batch_rewards.len(),
            });
        }

        let mut next = state.clone();
        for i in 0..self.population_size {
            let reward = reward_key(batch_rewards[i]);
            if reward >= next.fitness[i] {
                next.population.row_mut(i).copy_from(&batch_features.row(i));
                next.fitness[i] = reward;
            }
        }
        Ok(next)
    }
}

/// Creates [`DifferentialEvolution`] strategies with one slot per
/// suggested row.
///
/// # Examples
///
/// ```
/// use acqopt::optimizer::{DEStrategy, DifferentialEvolutionFactory};
///
/// let factory = DifferentialEvolutionFactory::builder()
///     .mutation_factor(0.7)
///     .crossover_rate(0.5)
///     .strategy(DEStrategy::Best1)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct DifferentialEvolutionFactory {
    mutation_factor: f64,
    crossover_rate: f64,
    strategy: DEStrategy,
}

impl DifferentialEvolutionFactory {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn builder() -> DifferentialEvolutionFactoryBuilder {
        DifferentialEvolutionFactoryBuilder::new()
    }
}

impl Default for DifferentialEvolutionFactory {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl VectorizedStrategyFactory for DifferentialEvolutionFactory {
    type Strategy = DifferentialEvolution;

    fn create(
        &self,
        converter: &dyn ArrayConverter,
        suggestion_batch_size: usize,
    ) -> Result<DifferentialEvolution> {
        if !(self.mutation_factor.is_finite() && self.mutation_factor > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "mutation_factor must be positive, got {}",
                self.mutation_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(Error::InvalidConfiguration(format!(
                "crossover_rate must be in [0, 1], got {}",
                self.crossover_rate
            )));
        }
        Ok(DifferentialEvolution {
            layout: ColumnLayout::from_converter(converter),
            population_size: suggestion_batch_size,
            mutation_factor: self.mutation_factor,
            crossover_rate: self.crossover_rate,
            strategy: self.strategy,
        })
    }
}

/// Builder for [`DifferentialEvolutionFactory`].
#[derive(Clone, Debug)]
pub struct DifferentialEvolutionFactoryBuilder {
    mutation_factor: f64,
    crossover_rate: f64,
    strategy: DEStrategy,
}

impl DifferentialEvolutionFactoryBuilder {
    /// Creates a builder with F = 0.8, CR = 0.9 and `Rand1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mutation_factor: 0.8,
            crossover_rate: 0.9,
            strategy: DEStrategy::Rand1,
        }
    }

    /// Sets the mutation factor (F).
    #[must_use]
    pub fn mutation_factor(mut self, f: f64) -> Self {
        self.mutation_factor = f;
        self
    }

    /// Sets the crossover rate (CR).
    #[must_use]
    pub fn crossover_rate(mut self, cr: f64) -> Self {
        self.crossover_rate = cr;
        self
    }

    /// Sets the mutation strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: DEStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builds the factory.
    #[must_use]
    pub fn build(self) -> DifferentialEvolutionFactory {
        DifferentialEvolutionFactory {
            mutation_factor: self.mutation_factor,
            crossover_rate: self.crossover_rate,
            strategy: self.strategy,
        }
    }
}

impl Default for DifferentialEvolutionFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
