//! Buff/debuff uptime and proc counts

use crate::action::ActionId;
use crate::aggregator::Aggregator;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct AuraMetrics {
    pub id: ActionId,

    // Current iteration.
    pub uptime: Duration,
    pub procs: i32,

    agg: Aggregator,
    procs_sum: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuraReport {
    pub id: ActionId,
    pub uptime_seconds_avg: f64,
    pub uptime_seconds_stdev: f64,
    pub procs_avg: f64,
}

impl AuraMetrics {
    pub fn new(id: ActionId) -> Self {
        Self::backfilled(id, 0)
    }

    /// An aura first observed after `completed` iterations had no uptime in them.
    pub fn backfilled(id: ActionId, completed: u64) -> Self {
        Self {
            id,
            uptime: Duration::ZERO,
            procs: 0,
            agg: Aggregator::zeros(completed),
            procs_sum: 0,
        }
    }

    pub fn reset(&mut self) {
        self.uptime = Duration::ZERO;
        self.procs = 0;
    }

    pub fn done_iteration(&mut self) {
        self.agg.add(self.uptime.as_secs_f64());
        self.procs_sum += i64::from(self.procs);
    }

    pub fn merge(&mut self, other: &AuraMetrics) {
        self.agg.merge(&other.agg);
        self.procs_sum += other.procs_sum;
    }

    pub fn to_report(&self) -> AuraReport {
        let (mean, stdev) = self.agg.mean_and_stdev();
        let n = self.agg.count();
        AuraReport {
            id: self.id,
            uptime_seconds_avg: mean,
            uptime_seconds_stdev: stdev,
            procs_avg: if n > 0 { self.procs_sum as f64 / n as f64 } else { 0.0 },
        }
    }
}
