//! Per-iteration rate distributions (dps, hps, dtps, ...)

use crate::aggregator::Aggregator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Facts about the iteration being folded, supplied by the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct IterationContext {
    pub duration: Duration,
    pub seed: i64,
    /// Keep every per-iteration value for the report.
    pub save_all_values: bool,
    /// How many iterations this metrics instance is expected to fold.
    pub expected_iterations: usize,
}

impl IterationContext {
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// One scalar quantity aggregated across iterations.
///
/// `total` is scratch for the current iteration; everything else spans the run.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionMetrics {
    pub total: f64,

    agg: Aggregator,
    max: f64,
    min: f64,
    max_seed: i64,
    min_seed: i64,
    hist: BTreeMap<i32, i32>,
    sample: Vec<f64>,
}

impl Default for DistributionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one distribution, as it appears in the run report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionReport {
    pub avg: f64,
    pub stdev: f64,
    pub max: f64,
    pub min: f64,
    pub max_seed: i64,
    pub min_seed: i64,
    pub hist: BTreeMap<i32, i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_values: Vec<f64>,
}

impl DistributionMetrics {
    pub fn new() -> Self {
        Self {
            total: 0.0,
            agg: Aggregator::new(),
            // Sentinels: any real rate replaces them on the first iteration.
            max: f64::NEG_INFINITY,
            min: f64::INFINITY,
            max_seed: 0,
            min_seed: 0,
            hist: BTreeMap::new(),
            sample: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.total = 0.0;
    }

    pub fn iterations(&self) -> u64 {
        self.agg.count()
    }

    /// Fold the current iteration's running total in as a per-second rate.
    pub fn done_iteration(&mut self, ctx: &IterationContext) {
        let secs = ctx.duration_secs();
        let rate = if secs > 0.0 { self.total / secs } else { 0.0 };
        self.agg.add(rate);

        if ctx.save_all_values {
            if self.sample.capacity() < ctx.expected_iterations {
                self.sample
                    .reserve(ctx.expected_iterations - self.sample.len());
            }
            self.sample.push(rate);
        }

        if rate > self.max {
            self.max = rate;
            self.max_seed = ctx.seed;
        }
        // `<=` on purpose: the most recent tying iteration owns the minimum.
        if rate <= self.min || self.agg.count() == 1 {
            self.min = rate;
            self.min_seed = ctx.seed;
        }

        *self.hist.entry(histogram_bucket(rate)).or_insert(0) += 1;
    }

    /// Absorb the aggregate state of `other`, which covers later iterations.
    pub fn merge(&mut self, other: &DistributionMetrics) {
        if other.agg.count() == 0 {
            return;
        }
        let was_empty = self.agg.count() == 0;
        self.agg.merge(&other.agg);
        if other.max > self.max {
            self.max = other.max;
            self.max_seed = other.max_seed;
        }
        if other.min <= self.min || was_empty {
            self.min = other.min;
            self.min_seed = other.min_seed;
        }
        for (&bucket, &count) in &other.hist {
            *self.hist.entry(bucket).or_insert(0) += count;
        }
        self.sample.extend_from_slice(&other.sample);
    }

    pub fn to_report(&self) -> DistributionReport {
        let (avg, stdev) = self.agg.mean_and_stdev();
        let seen = self.agg.count() > 0;
        DistributionReport {
            avg,
            stdev,
            max: if seen { self.max } else { 0.0 },
            min: if seen { self.min } else { 0.0 },
            max_seed: self.max_seed,
            min_seed: self.min_seed,
            hist: self.hist.clone(),
            all_values: self.sample.clone(),
        }
    }
}

/// Nearest multiple of 10, halves rounded away from zero.
fn histogram_bucket(rate: f64) -> i32 {
    ((rate / 10.0).round() * 10.0) as i32
}
