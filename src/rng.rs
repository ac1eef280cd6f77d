use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Seeded pseudo-random source shared by scholar generation, expedition
/// resolution and offer rolls. One instance lives inside the game service;
/// everything that draws from it is serialised by the single-writer rule.
pub struct DeterministicRng {
    inner: StdRng,
    seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform integer in the inclusive range `[low, high]`.
    pub fn randint(&mut self, low: i64, high: i64) -> i64 {
        debug_assert!(low <= high);
        self.inner.gen_range(low..=high)
    }

    /// Uniform float in `[low, high)`.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if low >= high {
            return low;
        }
        self.inner.gen_range(low..high)
    }

    /// One element of a non-empty slice.
    pub fn choice<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        debug_assert!(!items.is_empty());
        &items[self.inner.gen_range(0..items.len())]
    }

    /// Up to `k` distinct elements, cloned, in draw order.
    pub fn sample<T: Clone>(&mut self, items: &[T], k: usize) -> Vec<T> {
        let mut indices: Vec<usize> = (0..items.len()).collect();
        indices.shuffle(&mut self.inner);
        indices
            .into_iter()
            .take(k.min(items.len()))
            .map(|i| items[i].clone())
            .collect()
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }
}
