use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Random draws for pacing and phase decisions. Seedable so sessions can be
/// replayed deterministically.
#[derive(Debug)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixed-seed sampler for reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Bernoulli draw. Probabilities outside 0..=1 are clamped.
    pub fn chance(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    /// Uniform draw from [low, high]
    pub fn between(&mut self, range: (f64, f64)) -> f64 {
        let (low, high) = range;
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    /// Uniform duration from a range in seconds
    pub fn duration_between(&mut self, range_secs: (f64, f64)) -> Duration {
        Duration::from_secs_f64(self.between(range_secs).max(0.0))
    }

    /// Uniform integer count from [low, high]
    pub fn count(&mut self, range: (u32, u32)) -> u32 {
        let (low, high) = range;
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    /// Pick one element at random
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Pick up to `count` distinct elements at random
    pub fn pick_many<'a, T>(&mut self, items: &'a [T], count: usize) -> Vec<&'a T> {
        items.choose_multiple(&mut self.rng, count).collect()
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}
