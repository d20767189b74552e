//! Metrics for every combatant of one encounter
//!
//! Units are addressed by [`UnitIndex`]; one ability resolution can write to
//! the actor and to each of its targets, which live in the same table.

use crate::action::{ActionId, SpellMetrics, UnitIndex};
use crate::aggregator::Aggregator;
use crate::distribution::IterationContext;
use crate::report::SimReport;
use crate::resource::ResourceType;
use crate::unit::UnitMetrics;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Raid,
    Enemy,
}

/// Static description of a combatant, fixed for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    pub name: String,
    pub side: Side,
    /// Pets fold their damage into their owner at iteration end.
    pub owner: Option<UnitIndex>,
    /// TMI window width in seconds when the unit tanks.
    pub tmi_bin: Option<u32>,
    /// Health pool that damage taken is weighted against for TMI.
    pub reference_health: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct UnitSlot {
    spec: UnitSpec,
    metrics: UnitMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncounterMetrics {
    units: Vec<UnitSlot>,
    // Target roster per actor; outcome lists are indexed the same way.
    rosters: Vec<Vec<UnitIndex>>,
    duration: Aggregator,
}

impl EncounterMetrics {
    /// Every unit's roster is the full unit list, in order.
    pub fn new(specs: Vec<UnitSpec>) -> Self {
        let all: Vec<UnitIndex> = (0..specs.len()).collect();
        let units = specs
            .into_iter()
            .map(|spec| {
                let mut metrics = UnitMetrics::new();
                if let Some(bin) = spec.tmi_bin {
                    metrics.set_tanking(bin);
                }
                UnitSlot { spec, metrics }
            })
            .collect::<Vec<_>>();
        let rosters = vec![all; units.len()];
        Self {
            units,
            rosters,
            duration: Aggregator::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn roster(&self, actor: UnitIndex) -> &[UnitIndex] {
        &self.rosters[actor]
    }

    pub fn spec(&self, unit: UnitIndex) -> &UnitSpec {
        &self.units[unit].spec
    }

    pub fn unit(&self, unit: UnitIndex) -> &UnitMetrics {
        &self.units[unit].metrics
    }

    pub fn unit_mut(&mut self, unit: UnitIndex) -> &mut UnitMetrics {
        &mut self.units[unit].metrics
    }

    pub fn is_opponent(&self, a: UnitIndex, b: UnitIndex) -> bool {
        self.units[a].spec.side != self.units[b].spec.side
    }

    pub fn iterations(&self) -> u64 {
        self.duration.count()
    }

    /// Clears every unit's iteration scratch.
    pub fn iteration_start(&mut self) {
        for slot in &mut self.units {
            slot.metrics.reset();
        }
    }

    /// Folds the finished iteration. `current_mana[i]` is `None` for units
    /// without a mana bar; missing entries count as `None`.
    pub fn iteration_end(&mut self, ctx: &IterationContext, current_mana: &[Option<f64>]) {
        let mana = |i: UnitIndex| current_mana.get(i).copied().flatten();

        for i in 0..self.units.len() {
            if let Some(owner) = self.units[i].spec.owner {
                self.units[i].metrics.done_iteration(ctx, mana(i));
                let (pet, owner) = pair_mut(&mut self.units, i, owner);
                owner.metrics.add_final_pet_metrics(&pet.metrics);
            }
        }
        for i in 0..self.units.len() {
            if self.units[i].spec.owner.is_none() {
                self.units[i].metrics.done_iteration(ctx, mana(i));
            }
        }

        self.duration.add(ctx.duration_secs());
    }

    /// Records one ability resolution: one tally per entry of the actor's roster.
    ///
    /// Damage also lands in each target's damage-taken total. Against
    /// opponents it counts as the actor's damage and threat, against allies
    /// as the actor's healing and shielding.
    pub fn record_ability_outcome(
        &mut self,
        actor: UnitIndex,
        action_id: ActionId,
        is_melee: bool,
        outcomes: &[SpellMetrics],
    ) {
        let roster = &self.rosters[actor];
        self.units[actor]
            .metrics
            .action_metrics(action_id, is_melee)
            .add(roster, outcomes);

        let actor_side = self.units[actor].spec.side;
        for (&target, outcome) in roster.iter().zip(outcomes) {
            self.units[target].metrics.dtps.total += outcome.total_damage;

            let opponent = self.units[target].spec.side != actor_side;
            let metrics = &mut self.units[actor].metrics;
            if opponent {
                metrics.dps.total += outcome.total_damage;
                metrics.threat.total += outcome.total_threat;
            } else {
                metrics.hps.total += outcome.total_healing + outcome.total_shielding;
            }
        }
    }

    /// Gains are positive, costs negative. Mana also feeds time-to-OOM.
    pub fn record_resource_event(
        &mut self,
        unit: UnitIndex,
        action_id: ActionId,
        kind: ResourceType,
        gain: f64,
        actual_gain: f64,
    ) {
        let metrics = &mut self.units[unit].metrics;
        metrics
            .resource_metrics(action_id, kind)
            .add_event(gain, actual_gain);

        if kind == ResourceType::Mana {
            if actual_gain < 0.0 {
                metrics.iteration.mana_spent -= actual_gain;
            } else {
                metrics.iteration.mana_gained += actual_gain;
            }
        }
    }

    pub fn record_aura_tick(
        &mut self,
        unit: UnitIndex,
        aura_id: ActionId,
        uptime: Duration,
        procs: i32,
    ) {
        let aura = self.units[unit].metrics.aura_metrics(aura_id);
        aura.uptime += uptime;
        aura.procs += procs;
    }

    /// Logs damage taken for TMI, weighted by the unit's reference health.
    /// Ignored for units that are not tanking.
    pub fn record_damage_taken(&mut self, unit: UnitIndex, timestamp: Duration, damage: f64) {
        let slot = &mut self.units[unit];
        if slot.metrics.is_tanking() && slot.spec.reference_health > 0.0 {
            slot.metrics
                .add_tmi_event(timestamp, damage / slot.spec.reference_health);
        }
    }

    pub fn mark_died(&mut self, unit: UnitIndex) {
        self.units[unit].metrics.mark_died();
    }

    pub fn mark_resource_exhausted(&mut self, unit: UnitIndex, timestamp: Duration) {
        self.units[unit].metrics.mark_oom(timestamp);
    }

    pub fn add_oom_time(&mut self, unit: UnitIndex, now: Duration, dur: Duration) {
        self.units[unit].metrics.add_oom_time(now, dur);
    }

    /// Absorb a worker's metrics for the next block of iterations.
    /// Both sides must come from the same unit specs.
    pub fn merge(&mut self, other: &EncounterMetrics) {
        debug_assert_eq!(self.units.len(), other.units.len());
        for (mine, theirs) in self.units.iter_mut().zip(&other.units) {
            mine.metrics.merge(&theirs.metrics);
        }
        self.duration.merge(&other.duration);
    }

    pub fn to_report(&self) -> SimReport {
        let (avg, stdev) = self.duration.mean_and_stdev();
        SimReport {
            iterations: self.iterations(),
            duration_secs_avg: avg,
            duration_secs_stdev: stdev,
            units: self
                .units
                .iter()
                .map(|slot| slot.metrics.to_report(&slot.spec.name))
                .collect(),
        }
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "a unit cannot be its own pet");
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
