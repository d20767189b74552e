//! Resource gain/spend counters

use crate::action::ActionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Health,
    Mana,
    Rage,
    Energy,
    ComboPoints,
    Focus,
}

/// Gains of one resource from one action, cumulative over the run.
///
/// `reset` moves a checkpoint instead of zeroing, so the current iteration's
/// share is always `cumulative - checkpoint`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMetrics {
    pub action_id: ActionId,
    pub kind: ResourceType,

    pub events: i32,
    pub gain: f64,
    pub actual_gain: f64,

    events_from_previous_iterations: i32,
    actual_gain_from_previous_iterations: f64,

    // Anything recorded before the first reset is setup noise, not reported.
    baseline: Option<Baseline>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Baseline {
    events: i32,
    gain: f64,
    actual_gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub events: i32,
    pub gain: f64,
    pub actual_gain: f64,
}

impl ResourceMetrics {
    pub fn new(action_id: ActionId, kind: ResourceType) -> Self {
        Self {
            action_id,
            kind,
            events: 0,
            gain: 0.0,
            actual_gain: 0.0,
            events_from_previous_iterations: 0,
            actual_gain_from_previous_iterations: 0.0,
            baseline: None,
        }
    }

    /// Negative gains are valid (a cost paid).
    pub fn add_event(&mut self, gain: f64, actual_gain: f64) {
        self.events += 1;
        self.gain += gain;
        self.actual_gain += actual_gain;
    }

    pub fn reset(&mut self) {
        if self.baseline.is_none() {
            self.baseline = Some(Baseline {
                events: self.events,
                gain: self.gain,
                actual_gain: self.actual_gain,
            });
        }
        self.events_from_previous_iterations = self.events;
        self.actual_gain_from_previous_iterations = self.actual_gain;
    }

    pub fn events_for_current_iteration(&self) -> i32 {
        self.events - self.events_from_previous_iterations
    }

    pub fn actual_gain_for_current_iteration(&self) -> f64 {
        self.actual_gain - self.actual_gain_from_previous_iterations
    }

    fn baseline(&self) -> Baseline {
        self.baseline.unwrap_or(Baseline { events: 0, gain: 0.0, actual_gain: 0.0 })
    }

    /// Events recorded since tracking started.
    pub fn tracked_events(&self) -> i32 {
        self.events - self.baseline().events
    }

    /// Absorb the tracked (post-baseline) totals of `other`.
    pub fn merge(&mut self, other: &ResourceMetrics) {
        let theirs = other.baseline();
        self.events += other.events - theirs.events;
        self.gain += other.gain - theirs.gain;
        self.actual_gain += other.actual_gain - theirs.actual_gain;
        self.events_from_previous_iterations = self.events;
        self.actual_gain_from_previous_iterations = self.actual_gain;
    }

    pub fn to_report(&self) -> ResourceReport {
        let base = self.baseline();
        ResourceReport {
            id: self.action_id,
            kind: self.kind,
            events: self.events - base.events,
            gain: self.gain - base.gain,
            actual_gain: self.actual_gain - base.actual_gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mana() -> ResourceMetrics {
        ResourceMetrics::new(ActionId::other(1), ResourceType::Mana)
    }

    #[test]
    fn current_iteration_delta() {
        let mut r = mana();
        r.add_event(10.0, 8.0);
        r.add_event(5.0, 5.0);
        r.reset();
        r.add_event(2.0, 2.0);
        assert_eq!(r.events_for_current_iteration(), 1);
        assert_eq!(r.actual_gain_for_current_iteration(), 2.0);
        assert_eq!(r.events, 3);
        assert_eq!(r.gain, 17.0);
    }

    #[test]
    fn negative_gain_is_accepted() {
        let mut r = mana();
        r.reset();
        r.add_event(-300.0, -300.0);
        assert_eq!(r.actual_gain_for_current_iteration(), -300.0);
    }

    #[test]
    fn setup_events_excluded_from_report() {
        let mut r = mana();
        r.add_event(100.0, 100.0);
        r.reset();
        r.add_event(4.0, 3.0);
        r.reset();
        r.add_event(6.0, 6.0);
        let report = r.to_report();
        assert_eq!(report.events, 2);
        assert_eq!(report.gain, 10.0);
        assert_eq!(report.actual_gain, 9.0);
    }

    #[test]
    fn reset_twice_is_same_as_once() {
        let mut r = mana();
        r.add_event(1.0, 1.0);
        r.reset();
        let once = r.clone();
        r.reset();
        assert_eq!(r, once);
    }

    #[test]
    fn merge_drops_other_setup_events() {
        let mut a = mana();
        a.reset();
        a.add_event(2.0, 2.0);
        let mut b = mana();
        b.add_event(50.0, 50.0);
        b.reset();
        b.add_event(3.0, 1.0);
        a.merge(&b);
        let report = a.to_report();
        assert_eq!(report.events, 2);
        assert_eq!(report.gain, 5.0);
        assert_eq!(report.actual_gain, 3.0);
    }
}
