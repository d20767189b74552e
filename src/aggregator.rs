//! Online mean / standard deviation accumulator

use serde::{Deserialize, Serialize};

/// Running mean and variance of a scalar distribution (Welford's method).
///
/// Never stores raw values. Variance is the population variance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregator {
    n: u64,
    mean: f64,
    sum_sq: f64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An aggregator that has already seen `n` zeros.
    pub fn zeros(n: u64) -> Self {
        Self { n, mean: 0.0, sum_sq: 0.0 }
    }

    pub fn add(&mut self, value: f64) {
        self.n += 1;
        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        self.sum_sq += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    /// Returns `(mean, stdev)`, or `(0, 0)` when nothing was added.
    pub fn mean_and_stdev(&self) -> (f64, f64) {
        if self.n == 0 {
            return (0.0, 0.0);
        }
        (self.mean, (self.sum_sq / self.n as f64).sqrt())
    }

    /// Combine with an aggregator built from a disjoint set of values (Chan et al.).
    pub fn merge(&mut self, other: &Aggregator) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = other.clone();
            return;
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        let (na, nb) = (self.n as f64, other.n as f64);
        self.mean += delta * nb / n as f64;
        self.sum_sq += other.sum_sq + delta * delta * na * nb / n as f64;
        self.n = n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    fn assert_close(a: f64, b: f64) {
        let tol = 1e-9 * a.abs().max(b.abs()).max(1.0);
        assert!((a - b).abs() <= tol, "{a} != {b}");
    }

    #[test]
    fn empty_reports_zero() {
        assert_eq!(Aggregator::new().mean_and_stdev(), (0.0, 0.0));
    }

    #[test]
    fn matches_brute_force_for_every_prefix() {
        let values = [3.5, -1.0, 12.25, 7.0, 7.0, 1e6, 0.0, 42.0, -17.5, 3.0];
        let mut agg = Aggregator::new();
        for (i, &v) in values.iter().enumerate() {
            agg.add(v);
            let (mean, stdev) = agg.mean_and_stdev();
            let (want_mean, want_stdev) = brute_force(&values[..=i]);
            assert_close(mean, want_mean);
            assert_close(stdev, want_stdev);
            assert_eq!(agg.count(), i as u64 + 1);
        }
    }

    #[test]
    fn constant_values_have_zero_stdev() {
        let mut agg = Aggregator::new();
        for _ in 0..1000 {
            agg.add(1234.5678);
        }
        let (mean, stdev) = agg.mean_and_stdev();
        assert_close(mean, 1234.5678);
        assert!(stdev < 1e-9);
    }

    #[test]
    fn merge_matches_sequential() {
        let values = [1.0, 9.0, 4.0, 4.0, 16.0, 2.5, 8.0];
        let mut whole = Aggregator::new();
        values.iter().for_each(|&v| whole.add(v));

        let mut left = Aggregator::new();
        let mut right = Aggregator::new();
        values[..3].iter().for_each(|&v| left.add(v));
        values[3..].iter().for_each(|&v| right.add(v));
        left.merge(&right);

        assert_eq!(left.count(), whole.count());
        let (m1, s1) = left.mean_and_stdev();
        let (m2, s2) = whole.mean_and_stdev();
        assert_close(m1, m2);
        assert_close(s1, s2);
    }

    #[test]
    fn zeros_behaves_like_adding_zeros() {
        let mut a = Aggregator::zeros(3);
        a.add(6.0);
        let (mean, stdev) = a.mean_and_stdev();
        assert_close(mean, 1.5);
        assert_close(stdev, brute_force(&[0.0, 0.0, 0.0, 6.0]).1);
    }
}
