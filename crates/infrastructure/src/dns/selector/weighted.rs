/// Picks elements randomly without replacement, with probability
/// proportional to their weights.
///
/// Each pick draws r in [1, total], walks the running weight sum to the
/// first index reaching r, and removes that element by swapping with the
/// last. O(n) per pick, O(1) extra space.
pub struct WeightedRand<T> {
    values: Vec<T>,
    weights: Vec<u32>,
    total_weight: u64,
    rng: fastrand::Rng,
}

impl<T> WeightedRand<T> {
    pub fn new(values: Vec<T>, weights: Vec<u32>) -> Self {
        Self::with_rng(values, weights, fastrand::Rng::new())
    }

    /// Constructor with an explicit PRNG, so tests can pin a seed.
    pub fn with_rng(values: Vec<T>, weights: Vec<u32>, rng: fastrand::Rng) -> Self {
        debug_assert_eq!(values.len(), weights.len());
        let total_weight = weights.iter().map(|&w| u64::from(w)).sum();
        Self {
            values,
            weights,
            total_weight,
            rng,
        }
    }

    pub fn pick(&mut self) -> Option<T> {
        if self.values.is_empty() {
            return None;
        }
        let r = self.rng.u64(1..=self.total_weight);
        let mut sum = 0u64;
        for i in 0..self.values.len() {
            sum += u64::from(self.weights[i]);
            if sum >= r {
                self.total_weight -= u64::from(self.weights[i]);
                self.weights.swap_remove(i);
                return Some(self.values.swap_remove(i));
            }
        }
        None
    }
}
