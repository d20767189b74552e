//! Per-combatant metrics and the iteration lifecycle

use crate::action::{ActionId, ActionMetrics, ActionReport};
use crate::aura::{AuraMetrics, AuraReport};
use crate::distribution::{DistributionMetrics, DistributionReport, IterationContext};
use crate::resource::{ResourceMetrics, ResourceReport, ResourceType};
use crate::tmi::{calculate_tmi, TmiEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Ceiling for time-to-OOM, also used when mana never runs down.
const MAX_TIME_TO_OOM_SECS: f64 = 60.0 * 60.0;

/// Metrics for the current iteration, for one unit. Kept as a separate struct
/// so it can be cleared in one assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterIterationMetrics {
    /// Whether this unit died in the current iteration.
    pub died: bool,
    /// Whether the unit hit OOM at least once in this iteration.
    pub went_oom: bool,

    pub mana_spent: f64,
    pub mana_gained: f64,

    /// Time spent not casting and waiting for regen.
    pub oom_time: Duration,
    pub first_oom_timestamp: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitMetrics {
    pub dps: DistributionMetrics,
    pub dpasp: DistributionMetrics,
    pub threat: DistributionMetrics,
    pub dtps: DistributionMetrics,
    pub tmi: DistributionMetrics,
    pub hps: DistributionMetrics,
    pub tto: DistributionMetrics,

    tmi_list: Vec<TmiEvent>,
    is_tanking: bool,
    tmi_bin: u32,

    pub iteration: CharacterIterationMetrics,

    // Aggregate values, updated after each iteration.
    num_iters_dead: u64,
    oom_time_sum: f64,
    actions: HashMap<ActionId, ActionMetrics>,
    resources: Vec<ResourceMetrics>,
    resource_index: HashMap<(ActionId, ResourceType), usize>,
    auras: Vec<AuraMetrics>,
    // Set by the first reset; resources created afterwards have nothing to exclude.
    tracking_started: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub name: String,
    pub dps: DistributionReport,
    pub dpasp: DistributionReport,
    pub threat: DistributionReport,
    pub dtps: DistributionReport,
    pub tmi: DistributionReport,
    pub hps: DistributionReport,
    pub tto: DistributionReport,
    pub seconds_oom_avg: f64,
    pub chance_of_death: f64,
    pub actions: Vec<ActionReport>,
    pub resources: Vec<ResourceReport>,
    pub auras: Vec<AuraReport>,
}

impl Default for UnitMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitMetrics {
    pub fn new() -> Self {
        Self {
            dps: DistributionMetrics::new(),
            dpasp: DistributionMetrics::new(),
            threat: DistributionMetrics::new(),
            dtps: DistributionMetrics::new(),
            tmi: DistributionMetrics::new(),
            hps: DistributionMetrics::new(),
            tto: DistributionMetrics::new(),
            tmi_list: Vec::new(),
            is_tanking: false,
            tmi_bin: 0,
            iteration: CharacterIterationMetrics::default(),
            num_iters_dead: 0,
            oom_time_sum: 0.0,
            actions: HashMap::new(),
            resources: Vec::new(),
            resource_index: HashMap::new(),
            auras: Vec::new(),
            tracking_started: false,
        }
    }

    /// Completed iterations folded into this unit.
    pub fn iterations(&self) -> u64 {
        self.dps.iterations()
    }

    /// Flag the unit as a tank; TMI is computed with `bin_secs` wide windows.
    pub fn set_tanking(&mut self, bin_secs: u32) {
        self.is_tanking = true;
        self.tmi_bin = bin_secs;
    }

    pub fn is_tanking(&self) -> bool {
        self.is_tanking
    }

    pub fn action_metrics(&mut self, id: ActionId, is_melee: bool) -> &mut ActionMetrics {
        self.actions
            .entry(id)
            .or_insert_with(|| ActionMetrics::new(is_melee))
    }

    pub fn actions(&self) -> &HashMap<ActionId, ActionMetrics> {
        &self.actions
    }

    pub fn resource_metrics(&mut self, id: ActionId, kind: ResourceType) -> &mut ResourceMetrics {
        let idx = match self.resource_index.get(&(id, kind)) {
            Some(&idx) => idx,
            None => {
                let mut resource = ResourceMetrics::new(id, kind);
                if self.tracking_started {
                    resource.reset();
                }
                self.resources.push(resource);
                let idx = self.resources.len() - 1;
                self.resource_index.insert((id, kind), idx);
                idx
            }
        };
        &mut self.resources[idx]
    }

    pub fn health_metrics(&mut self, id: ActionId) -> &mut ResourceMetrics {
        self.resource_metrics(id, ResourceType::Health)
    }
    pub fn mana_metrics(&mut self, id: ActionId) -> &mut ResourceMetrics {
        self.resource_metrics(id, ResourceType::Mana)
    }
    pub fn rage_metrics(&mut self, id: ActionId) -> &mut ResourceMetrics {
        self.resource_metrics(id, ResourceType::Rage)
    }
    pub fn energy_metrics(&mut self, id: ActionId) -> &mut ResourceMetrics {
        self.resource_metrics(id, ResourceType::Energy)
    }
    pub fn combo_point_metrics(&mut self, id: ActionId) -> &mut ResourceMetrics {
        self.resource_metrics(id, ResourceType::ComboPoints)
    }
    pub fn focus_metrics(&mut self, id: ActionId) -> &mut ResourceMetrics {
        self.resource_metrics(id, ResourceType::Focus)
    }

    pub fn aura_metrics(&mut self, id: ActionId) -> &mut AuraMetrics {
        let idx = match self.auras.iter().position(|a| a.id == id) {
            Some(idx) => idx,
            None => {
                let completed = self.iterations();
                self.auras.push(AuraMetrics::backfilled(id, completed));
                self.auras.len() - 1
            }
        };
        &mut self.auras[idx]
    }

    /// Log damage taken for TMI. Events must arrive in time order.
    pub fn add_tmi_event(&mut self, timestamp: Duration, weighted_damage: f64) {
        debug_assert!(
            self.tmi_list.last().map_or(true, |e| e.timestamp <= timestamp),
            "TMI events out of order"
        );
        self.tmi_list.push(TmiEvent {
            timestamp,
            weighted_damage,
        });
    }

    /// Include a pet's damage in its owner's. The pet keeps its own totals.
    pub fn add_final_pet_metrics(&mut self, pet: &UnitMetrics) {
        self.dps.total += pet.dps.total;
    }

    pub fn add_oom_time(&mut self, now: Duration, dur: Duration) {
        self.iteration.oom_time += dur;
        self.mark_oom(now);
    }

    pub fn mark_oom(&mut self, now: Duration) {
        if !self.iteration.went_oom {
            self.iteration.went_oom = true;
            self.iteration.first_oom_timestamp = now;
        }
    }

    pub fn mark_died(&mut self) {
        self.iteration.died = true;
    }

    /// `dpsp_seconds` is seconds * spell power; the distribution divides by duration.
    pub fn update_dpasp(&mut self, dpsp_seconds: f64) {
        self.dpasp.total += dpsp_seconds;
    }

    pub fn reset(&mut self) {
        self.dps.reset();
        self.dpasp.reset();
        self.threat.reset();
        self.dtps.reset();
        self.tmi.reset();
        self.tmi_list.clear();
        self.hps.reset();
        self.tto.reset();
        self.iteration = CharacterIterationMetrics::default();
        self.tracking_started = true;

        for resource in &mut self.resources {
            resource.reset();
        }
        for aura in &mut self.auras {
            aura.reset();
        }
    }

    /// Fold the finished iteration. `current_mana` is `None` for units without a mana bar.
    pub fn done_iteration(&mut self, ctx: &IterationContext, current_mana: Option<f64>) {
        let duration_secs = ctx.duration_secs();

        if let Some(mana) = current_mana {
            let time_to_oom = self.time_to_oom(duration_secs, mana);
            // tto reports seconds, not a rate; pre-scale so the division cancels.
            self.tto.total = time_to_oom * duration_secs;
        }

        if self.is_tanking {
            let tmi = calculate_tmi(&self.tmi_list, self.tmi_bin, ctx.duration);
            self.tmi.total = tmi * duration_secs;
        }

        self.dps.done_iteration(ctx);
        self.dpasp.done_iteration(ctx);
        self.threat.done_iteration(ctx);
        self.dtps.done_iteration(ctx);
        self.tmi.done_iteration(ctx);
        self.hps.done_iteration(ctx);
        self.tto.done_iteration(ctx);

        for aura in &mut self.auras {
            aura.done_iteration();
        }

        self.oom_time_sum += self.iteration.oom_time.as_secs_f64();
        if self.iteration.died {
            self.num_iters_dead += 1;
        }
    }

    fn time_to_oom(&self, duration_secs: f64, current_mana: f64) -> f64 {
        let tto = if self.iteration.went_oom {
            self.iteration.first_oom_timestamp.as_secs_f64()
        } else {
            // Never ran dry: extrapolate the remaining mana at this iteration's net burn.
            let spent_per_sec =
                (self.iteration.mana_spent - self.iteration.mana_gained) / duration_secs;
            if spent_per_sec > 0.0 {
                (duration_secs + current_mana / spent_per_sec).min(MAX_TIME_TO_OOM_SECS)
            } else {
                MAX_TIME_TO_OOM_SECS
            }
        };

        if tto < 0.0 || tto.is_nan() {
            MAX_TIME_TO_OOM_SECS
        } else {
            tto
        }
    }

    /// Absorb `other`, which covers a later, disjoint block of iterations.
    pub fn merge(&mut self, other: &UnitMetrics) {
        let ours = self.iterations();
        let theirs = other.iterations();

        self.dps.merge(&other.dps);
        self.dpasp.merge(&other.dpasp);
        self.threat.merge(&other.threat);
        self.dtps.merge(&other.dtps);
        self.tmi.merge(&other.tmi);
        self.hps.merge(&other.hps);
        self.tto.merge(&other.tto);

        self.num_iters_dead += other.num_iters_dead;
        self.oom_time_sum += other.oom_time_sum;
        self.tracking_started |= other.tracking_started;

        for (id, action) in &other.actions {
            self.actions
                .entry(*id)
                .or_insert_with(|| ActionMetrics::new(action.is_melee))
                .merge(action);
        }

        for resource in &other.resources {
            self.resource_metrics(resource.action_id, resource.kind)
                .merge(resource);
        }

        for aura in &mut self.auras {
            if !other.auras.iter().any(|a| a.id == aura.id) {
                aura.merge(&AuraMetrics::backfilled(aura.id, theirs));
            }
        }
        for aura in &other.auras {
            match self.auras.iter_mut().find(|a| a.id == aura.id) {
                Some(existing) => existing.merge(aura),
                None => {
                    let mut fresh = AuraMetrics::backfilled(aura.id, ours);
                    fresh.merge(aura);
                    self.auras.push(fresh);
                }
            }
        }
    }

    pub fn to_report(&self, name: &str) -> UnitReport {
        let n = self.iterations() as f64;
        let per_iteration = |sum: f64| if n > 0.0 { sum / n } else { 0.0 };

        let mut ids: Vec<_> = self.actions.keys().copied().collect();
        ids.sort();

        UnitReport {
            name: name.to_string(),
            dps: self.dps.to_report(),
            dpasp: self.dpasp.to_report(),
            threat: self.threat.to_report(),
            dtps: self.dtps.to_report(),
            tmi: self.tmi.to_report(),
            hps: self.hps.to_report(),
            tto: self.tto.to_report(),
            seconds_oom_avg: per_iteration(self.oom_time_sum),
            chance_of_death: per_iteration(self.num_iters_dead as f64),
            actions: ids
                .into_iter()
                .map(|id| self.actions[&id].to_report(id))
                .collect(),
            resources: self
                .resources
                .iter()
                .filter(|r| r.tracked_events() > 0)
                .map(|r| r.to_report())
                .collect(),
            auras: self.auras.iter().map(|a| a.to_report()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(secs: u64, seed: i64) -> IterationContext {
        IterationContext {
            duration: Duration::from_secs(secs),
            seed,
            save_all_values: false,
            expected_iterations: 0,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn reset_clears_iteration_state_only() {
        let mut unit = UnitMetrics::new();
        unit.dps.total = 300.0;
        unit.mark_died();
        unit.add_tmi_event(Duration::from_secs(1), 0.2);
        unit.done_iteration(&ctx(10, 1), None);

        unit.reset();
        let once = unit.clone();
        unit.reset();
        assert_eq!(unit, once);
        assert_eq!(unit.dps.total, 0.0);
        assert!(!unit.iteration.died);
        assert!(unit.tmi_list.is_empty());
        assert_eq!(unit.iterations(), 1);
    }

    #[test]
    fn rates_and_death_chance() {
        let mut unit = UnitMetrics::new();
        for (i, died) in [true, false, false, false].into_iter().enumerate() {
            unit.reset();
            unit.dps.total = 1000.0;
            unit.hps.total = 500.0;
            if died {
                unit.mark_died();
            }
            unit.done_iteration(&ctx(10, i as i64), None);
        }
        let report = unit.to_report("mage");
        assert!(close(report.dps.avg, 100.0));
        assert!(close(report.hps.avg, 50.0));
        assert!(close(report.chance_of_death, 0.25));
        assert_eq!(report.name, "mage");
    }

    #[test]
    fn tto_uses_first_oom_timestamp() {
        let mut unit = UnitMetrics::new();
        unit.reset();
        unit.add_oom_time(Duration::from_secs(42), Duration::from_secs(3));
        unit.add_oom_time(Duration::from_secs(80), Duration::from_secs(2));
        unit.done_iteration(&ctx(120, 1), Some(0.0));
        let report = unit.to_report("priest");
        assert!(close(report.tto.avg, 42.0));
        assert!(close(report.seconds_oom_avg, 5.0));
    }

    #[test]
    fn tto_extrapolates_remaining_mana() {
        let mut unit = UnitMetrics::new();
        unit.reset();
        unit.iteration.mana_spent = 1200.0;
        unit.iteration.mana_gained = 200.0;
        // 1000 net over 100s = 10/s; 500 left lasts another 50s.
        unit.done_iteration(&ctx(100, 1), Some(500.0));
        assert!(close(unit.to_report("p").tto.avg, 150.0));
    }

    #[test]
    fn tto_clamps_to_one_hour() {
        let mut unit = UnitMetrics::new();
        unit.reset();
        unit.iteration.mana_spent = 10.0;
        unit.done_iteration(&ctx(100, 1), Some(1e9));
        assert!(close(unit.to_report("p").tto.avg, 3600.0));

        // Net mana gain: never goes OOM.
        let mut regen = UnitMetrics::new();
        regen.reset();
        regen.iteration.mana_gained = 50.0;
        regen.done_iteration(&ctx(100, 1), Some(1000.0));
        assert!(close(regen.to_report("p").tto.avg, 3600.0));

        // No mana movement at all.
        let mut idle = UnitMetrics::new();
        idle.reset();
        idle.done_iteration(&ctx(100, 1), Some(0.0));
        assert!(close(idle.to_report("p").tto.avg, 3600.0));
    }

    #[test]
    fn units_without_mana_report_no_tto() {
        let mut unit = UnitMetrics::new();
        unit.reset();
        unit.done_iteration(&ctx(100, 1), None);
        assert_eq!(unit.to_report("w").tto.avg, 0.0);
    }

    #[test]
    fn tmi_only_for_tanks() {
        let mut dps = UnitMetrics::new();
        let mut tank = UnitMetrics::new();
        tank.set_tanking(6);
        for unit in [&mut dps, &mut tank] {
            unit.reset();
            for s in 0..60 {
                unit.add_tmi_event(Duration::from_secs(s), 0.1);
            }
            unit.done_iteration(&ctx(60, 1), None);
        }
        assert_eq!(dps.to_report("d").tmi.avg, 0.0);
        assert!(close(tank.to_report("t").tmi.avg, 60.0));
    }

    #[test]
    fn pet_damage_goes_to_owner() {
        let mut owner = UnitMetrics::new();
        let mut pet = UnitMetrics::new();
        owner.dps.total = 100.0;
        pet.dps.total = 40.0;
        owner.add_final_pet_metrics(&pet);
        assert_eq!(owner.dps.total, 140.0);
        assert_eq!(pet.dps.total, 40.0);
    }

    #[test]
    fn dpasp_is_a_rate() {
        let mut unit = UnitMetrics::new();
        unit.reset();
        unit.update_dpasp(2000.0);
        unit.update_dpasp(1000.0);
        unit.done_iteration(&ctx(10, 1), None);
        assert!(close(unit.to_report("p").dpasp.avg, 300.0));
    }

    #[test]
    fn get_or_create_returns_same_entry() {
        let mut unit = UnitMetrics::new();
        unit.mana_metrics(ActionId::spell(1)).add_event(5.0, 5.0);
        unit.mana_metrics(ActionId::spell(1)).add_event(5.0, 4.0);
        unit.rage_metrics(ActionId::spell(1)).add_event(1.0, 1.0);
        assert_eq!(unit.resources.len(), 2);
        assert_eq!(unit.mana_metrics(ActionId::spell(1)).events, 2);

        unit.action_metrics(ActionId::spell(2), true);
        unit.action_metrics(ActionId::spell(2), false);
        assert_eq!(unit.actions().len(), 1);
        assert!(unit.actions()[&ActionId::spell(2)].is_melee);
    }

    #[test]
    fn report_omits_untracked_resources() {
        let mut unit = UnitMetrics::new();
        unit.energy_metrics(ActionId::other(1)).add_event(10.0, 10.0);
        unit.focus_metrics(ActionId::other(2));
        unit.reset();
        unit.focus_metrics(ActionId::other(2)).add_event(3.0, 3.0);
        unit.done_iteration(&ctx(10, 1), None);
        let report = unit.to_report("hunter");
        assert_eq!(report.resources.len(), 1);
        assert_eq!(report.resources[0].kind, ResourceType::Focus);
    }

    #[test]
    fn resource_created_mid_run_keeps_first_iteration() {
        let mut unit = UnitMetrics::new();
        unit.reset();
        unit.mana_metrics(ActionId::spell(3)).add_event(-50.0, -50.0);
        unit.done_iteration(&ctx(10, 1), Some(100.0));
        unit.reset();
        unit.mana_metrics(ActionId::spell(3)).add_event(-50.0, -50.0);
        unit.done_iteration(&ctx(10, 2), Some(100.0));
        let report = unit.to_report("p");
        assert_eq!(report.resources[0].events, 2);
        assert_eq!(report.resources[0].gain, -100.0);
    }

    #[test]
    fn late_aura_is_backfilled() {
        let mut unit = UnitMetrics::new();
        for i in 0..3 {
            unit.reset();
            if i == 2 {
                let aura = unit.aura_metrics(ActionId::spell(9));
                aura.uptime = Duration::from_secs(30);
                aura.procs = 3;
            }
            unit.done_iteration(&ctx(60, i), None);
        }
        let report = unit.to_report("u");
        assert!(close(report.auras[0].uptime_seconds_avg, 10.0));
        assert!(close(report.auras[0].procs_avg, 1.0));
    }

    #[test]
    fn merge_matches_sequential_folding() {
        let totals = [120.0, 80.0, 200.0, 40.0];
        let run = |unit: &mut UnitMetrics, i: usize| {
            unit.reset();
            unit.dps.total = totals[i];
            unit.action_metrics(ActionId::spell(1), false);
            if i == 3 {
                unit.mark_died();
                unit.aura_metrics(ActionId::spell(5)).uptime = Duration::from_secs(4);
            }
            unit.done_iteration(&ctx(2, i as i64), None);
        };

        let mut whole = UnitMetrics::new();
        (0..4).for_each(|i| run(&mut whole, i));

        let mut left = UnitMetrics::new();
        let mut right = UnitMetrics::new();
        (0..2).for_each(|i| run(&mut left, i));
        (2..4).for_each(|i| run(&mut right, i));
        left.merge(&right);

        let a = left.to_report("x");
        let b = whole.to_report("x");
        assert!(close(a.dps.avg, b.dps.avg));
        assert!(close(a.dps.stdev, b.dps.stdev));
        assert_eq!(a.dps.max_seed, b.dps.max_seed);
        assert_eq!(a.dps.min_seed, b.dps.min_seed);
        assert_eq!(a.dps.hist, b.dps.hist);
        assert!(close(a.chance_of_death, b.chance_of_death));
        assert!(close(a.auras[0].uptime_seconds_avg, b.auras[0].uptime_seconds_avg));
        assert!(close(a.auras[0].uptime_seconds_avg, 1.0));
    }
}
