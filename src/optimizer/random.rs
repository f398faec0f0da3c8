//! Uniform random search.

use nalgebra::{DMatrix, DVector};

use super::layout::ColumnLayout;
use super::{VectorizedStrategy, VectorizedStrategyFactory};
use crate::converter::ArrayConverter;
use crate::error::{Error, Result};

/// Samples every batch uniformly at random, ignoring rewards.
///
/// Continuous columns are drawn from `[0, 1]`; each one-hot block gets a
/// single uniformly chosen hot entry. The state only counts steps, so the
/// batches depend on nothing but the per-step seed.
///
/// # Examples
///
/// ```
/// use acqopt::optimizer::{RandomStrategyFactory, VectorizedStrategy, VectorizedStrategyFactory};
/// use acqopt::prelude::*;
///
/// let problem = ProblemStatement::new(SearchSpace::new().add_float("x", 0.0, 1.0));
/// let converter = TrialToArrayConverter::from_problem(&problem).unwrap();
/// let strategy = RandomStrategyFactory.create(&converter, 8).unwrap();
/// let state = strategy.init_state(0, None, None).unwrap();
/// assert_eq!(strategy.suggest(&state, 1).unwrap().shape(), (8, 1));
/// ```
#[derive(Clone, Debug)]
pub struct RandomStrategy {
    layout: ColumnLayout,
    suggestion_batch_size: usize,
}

impl VectorizedStrategy for RandomStrategy {
    type State = u64;

    fn init_state(
        &self,
        _seed: u64,
        _prior_features: Option<&DMatrix<f64>>,
        _prior_rewards: Option<&DVector<f64>>,
    ) -> Result<u64> {
        Ok(0)
    }

    fn suggest(&self, _state: &u64, seed: u64) -> Result<DMatrix<f64>> {
        let mut rng = fastrand::Rng::with_seed(seed);
        Ok(self.layout.sample(&mut rng, self.suggestion_batch_size))
    }

    fn suggestion_batch_size(&self) -> usize {
        self.suggestion_batch_size
    }

    fn update(
        &self,
        state: &u64,
        batch_features: &DMatrix<f64>,
        batch_rewards: &DVector<f64>,
        _seed: u64,
    ) -> Result<u64> {
        if batch_features.nrows() != batch_rewards.len() {
            return Err(Error::DimensionMismatch {
                what: "batch rewards",
                expected: batch_features.nrows(),
                got: batch_rewards.len(),
            });
        }
        Ok(state + 1)
    }
}

/// Creates [`RandomStrategy`] instances.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomStrategyFactory;

impl VectorizedStrategyFactory for RandomStrategyFactory {
    type Strategy = RandomStrategy;

    fn create(
        &self,
        converter: &dyn ArrayConverter,
        suggestion_batch_size: usize,
    ) -> Result<RandomStrategy> {
        Ok(RandomStrategy {
            layout: ColumnLayout::from_converter(converter),
            suggestion_batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::TrialToArrayConverter;
    use crate::problem::{ProblemStatement, SearchSpace};

    fn strategy(batch: usize) -> RandomStrategy {
        let problem = ProblemStatement::new(
            SearchSpace::new()
                .add_float("x", -1.0, 1.0)
                .add_int("n", 0, 4)
                .add_categorical("c", ["a", "b"]),
        );
        let converter = TrialToArrayConverter::from_problem(&problem).unwrap();
        RandomStrategyFactory.create(&converter, batch).unwrap()
    }

    #[test]
    fn suggestions_depend_only_on_seed() {
        let s = strategy(6);
        let a = s.suggest(&0, 11).unwrap();
        assert_eq!(a, s.suggest(&5, 11).unwrap());
        assert_ne!(a, s.suggest(&0, 12).unwrap());
        assert_eq!(a.shape(), (6, 4));
    }

    #[test]
    fn update_counts_steps() {
        let s = strategy(2);
        let state = s.init_state(0, None, None).unwrap();
        let xs = s.suggest(&state, 0).unwrap();
        let next = s.update(&state, &xs, &DVector::zeros(2), 0).unwrap();
        assert_eq!(next, 1);
        assert!(matches!(
            s.update(&next, &xs, &DVector::zeros(3), 0),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
