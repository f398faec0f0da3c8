use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

/// Generate a random `f64` in the range `[low, high)`.
#[inline]
pub(crate) fn f64_range(rng: &mut fastrand::Rng, low: f64, high: f64) -> f64 {
    low + rng.f64() * (high - low)
}

/// Deterministically derive `N` independent sub-seeds from `seed`.
pub(crate) fn split_seed<const N: usize>(seed: u64) -> [u64; N] {
    let mut rng = fastrand::Rng::with_seed(seed);
    core::array::from_fn(|_| rng.u64(..))
}

/// Seeded generator used for Gaussian draws.
pub(crate) fn normal_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Sample from the standard normal distribution (Box-Muller).
pub(crate) fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..=1.0);
    let u2: f64 = rng.random_range(0.0_f64..=core::f64::consts::TAU);
    (-2.0 * u1.ln()).sqrt() * u2.cos()
}
