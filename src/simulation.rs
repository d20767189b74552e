//! Scripted encounter driver and iteration runner
//!
//! The driver replays an [`EncounterConfig`] once per iteration and reports
//! every resolution to [`EncounterMetrics`]. Parallel runs give each worker a
//! private metrics table for a contiguous block of iterations, then merge the
//! blocks in order on the calling thread.

use crate::action::{ActionId, SpellMetrics, UnitIndex};
use crate::config::{AbilityConfig, AbilityKind, EncounterConfig, RunOptions};
use crate::distribution::IterationContext;
use crate::encounter::{EncounterMetrics, UnitSpec};
use crate::error::SimError;
use crate::report::SimReport;
use crate::resource::ResourceType;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;
use std::time::{Duration, Instant};

const MANA_TICK_SECS: f64 = 2.0;
/// Share of damage a successful block absorbs.
const BLOCK_REDUCTION: f64 = 0.3;
const GLANCE_MULTIPLIER: f64 = 0.75;
const MANA_REGEN_ACTION: i32 = 1;

/// Event in the simulation queue
#[derive(Debug, Clone)]
struct Event {
    time: f64,
    priority: i32, // Lower = higher priority
    action: Action,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.priority == other.priority
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .time
            .partial_cmp(&self.time)
            .unwrap_or(Ordering::Equal)
            .then(other.priority.cmp(&self.priority))
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Cast { unit: UnitIndex, ability: usize },
    ManaTick { unit: UnitIndex },
}

/// Live state of one combatant during an iteration
#[derive(Debug, Clone)]
struct Combatant {
    health: f64,
    max_health: f64,
    mana: Option<f64>,
    max_mana: f64,
    alive: bool,
    // Expiry time per aura id
    auras: Vec<(i32, f64)>,
}

/// A validated encounter with targets resolved up front
#[derive(Debug, Clone)]
pub struct Encounter {
    config: EncounterConfig,
    specs: Vec<UnitSpec>,
    // targets[unit][ability]
    targets: Vec<Vec<UnitIndex>>,
}

impl Encounter {
    pub fn new(config: EncounterConfig) -> Result<Self, SimError> {
        config.validate()?;
        let specs = config.unit_specs()?;
        let targets = config
            .units
            .iter()
            .enumerate()
            .map(|(idx, unit)| {
                unit.abilities
                    .iter()
                    .map(|ability| config.ability_target(idx, ability))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            specs,
            targets,
        })
    }

    pub fn config(&self) -> &EncounterConfig {
        &self.config
    }

    /// Fresh, empty metrics for this encounter's units.
    pub fn new_metrics(&self) -> EncounterMetrics {
        EncounterMetrics::new(self.specs.clone())
    }

    fn roll_duration(&self, rng: &mut impl Rng) -> f64 {
        let base = self.config.duration_secs;
        let var = self.config.duration_variation_secs;
        if var > 0.0 {
            rng.gen_range(base - var..=base + var)
        } else {
            base
        }
    }

    /// Run one iteration with the given seed, folding it into `metrics`.
    pub fn run_iteration(
        &self,
        metrics: &mut EncounterMetrics,
        seed: i64,
        save_all_values: bool,
        expected_iterations: usize,
    ) {
        let mut rng = SmallRng::seed_from_u64(seed as u64);
        let duration = self.roll_duration(&mut rng);

        metrics.iteration_start();

        let mut units: Vec<Combatant> = self
            .config
            .units
            .iter()
            .map(|u| Combatant {
                health: u.health,
                max_health: u.health,
                mana: u.mana,
                max_mana: u.mana.unwrap_or(0.0),
                alive: true,
                auras: Vec::new(),
            })
            .collect();

        let mut queue: BinaryHeap<Event> = BinaryHeap::new();
        for (idx, unit) in self.config.units.iter().enumerate() {
            for (ability_idx, ability) in unit.abilities.iter().enumerate() {
                // Stagger openers so every unit doesn't act on the same tick.
                queue.push(Event {
                    time: rng.gen::<f64>() * ability.interval_secs,
                    priority: 1,
                    action: Action::Cast {
                        unit: idx,
                        ability: ability_idx,
                    },
                });
            }
            if unit.mana.is_some() {
                queue.push(Event {
                    time: MANA_TICK_SECS,
                    priority: 2,
                    action: Action::ManaTick { unit: idx },
                });
            }
        }

        while let Some(event) = queue.pop() {
            if event.time >= duration {
                break;
            }
            let now = event.time;

            match event.action {
                Action::Cast { unit, ability } => {
                    if !units[unit].alive {
                        continue;
                    }
                    let next = self.cast(metrics, &mut units, &mut rng, unit, ability, now, duration);
                    queue.push(Event {
                        time: next,
                        priority: 1,
                        action: event.action,
                    });
                }
                Action::ManaTick { unit } => {
                    if !units[unit].alive {
                        continue;
                    }
                    let regen = self.config.units[unit].mana_regen_per_tick;
                    regen_mana(metrics, &mut units[unit], unit, regen);
                    queue.push(Event {
                        time: now + MANA_TICK_SECS,
                        priority: 2,
                        action: event.action,
                    });
                }
            }
        }

        let current_mana: Vec<Option<f64>> = units.iter().map(|u| u.mana).collect();
        let ctx = IterationContext {
            duration: Duration::from_secs_f64(duration),
            seed,
            save_all_values,
            expected_iterations,
        };
        metrics.iteration_end(&ctx, &current_mana);
    }

    /// Resolve one cast. Returns when the caster acts next.
    #[allow(clippy::too_many_arguments)]
    fn cast(
        &self,
        metrics: &mut EncounterMetrics,
        units: &mut [Combatant],
        rng: &mut impl Rng,
        caster: UnitIndex,
        ability_idx: usize,
        now: f64,
        duration: f64,
    ) -> f64 {
        let ability = &self.config.units[caster].abilities[ability_idx];
        let action_id = ActionId::spell(ability.id);
        let target = self.targets[caster][ability_idx];
        let next = now + ability.interval_secs.max(ability.cast_time_secs);

        if !units[target].alive {
            return next;
        }

        if ability.mana_cost > 0.0 {
            let mana = units[caster].mana.unwrap_or(0.0);
            if mana < ability.mana_cost {
                // Wait for regen and try again.
                let wait = MANA_TICK_SECS.min(duration - now);
                metrics.add_oom_time(
                    caster,
                    Duration::from_secs_f64(now),
                    Duration::from_secs_f64(wait),
                );
                return now + MANA_TICK_SECS;
            }
            units[caster].mana = Some(mana - ability.mana_cost);
            metrics.record_resource_event(
                caster,
                action_id,
                ResourceType::Mana,
                -ability.mana_cost,
                -ability.mana_cost,
            );
        }

        let outcome = roll_outcome(ability, rng);
        let amount = outcome.amount;
        let mut tally = outcome.tally;
        tally.total_cast_time = Duration::from_secs_f64(ability.cast_time_secs);

        match ability.kind {
            AbilityKind::Damage if amount > 0.0 => {
                let victim = &mut units[target];
                victim.health -= amount;
                tally.total_damage = amount;
                tally.total_threat = amount * ability.threat_multiplier;
                metrics.record_damage_taken(target, Duration::from_secs_f64(now), amount);
                if victim.alive && victim.health <= 0.0 {
                    victim.alive = false;
                    metrics.mark_died(target);
                }
            }
            AbilityKind::Heal if amount > 0.0 => {
                let patient = &mut units[target];
                let actual = amount.min(patient.max_health - patient.health).max(0.0);
                patient.health += actual;
                tally.total_healing = actual;
                metrics.record_resource_event(target, action_id, ResourceType::Health, amount, actual);
            }
            _ => {}
        }

        let mut outcomes = vec![SpellMetrics::default(); metrics.roster(caster).len()];
        if let Some(slot) = metrics.roster(caster).iter().position(|&u| u == target) {
            outcomes[slot] = tally;
        }
        metrics.record_ability_outcome(caster, action_id, ability.melee, &outcomes);

        if let Some(aura) = &ability.aura {
            if outcome.landed && rng.gen::<f64>() < aura.chance {
                let uptime = refresh_aura(&mut units[caster], aura.id, now, aura.duration_secs, duration);
                metrics.record_aura_tick(
                    caster,
                    ActionId::spell(aura.id),
                    Duration::from_secs_f64(uptime),
                    1,
                );
            }
        }

        next
    }

    /// Run iterations `range` into a fresh metrics table.
    pub fn run_block(&self, options: &RunOptions, range: Range<usize>) -> EncounterMetrics {
        let mut metrics = self.new_metrics();
        let expected = range.len();
        for i in range {
            let seed = options.random_seed.wrapping_add(i as i64);
            self.run_iteration(&mut metrics, seed, options.save_all_values, expected);
        }
        metrics
    }
}

struct RolledOutcome {
    tally: SpellMetrics,
    amount: f64,
    landed: bool,
}

fn roll_outcome(ability: &AbilityConfig, rng: &mut impl Rng) -> RolledOutcome {
    let mut tally = SpellMetrics {
        casts: 1,
        ..Default::default()
    };
    let base = rng.gen_range(ability.min_amount..=ability.max_amount);

    // One roll walks the cumulative table: miss, dodge, parry, glance, crit, hit.
    let roll = rng.gen::<f64>();
    let mut edge = 0.0;
    let mut under = |chance: f64| {
        edge += chance;
        roll < edge
    };
    let multiplier = if under(ability.miss_chance) {
        tally.misses += 1;
        None
    } else if under(ability.dodge_chance) {
        tally.dodges += 1;
        None
    } else if under(ability.parry_chance) {
        tally.parries += 1;
        None
    } else if under(ability.glance_chance) {
        tally.glances += 1;
        Some(GLANCE_MULTIPLIER)
    } else if under(ability.crit_chance) {
        tally.crits += 1;
        Some(ability.crit_multiplier)
    } else {
        tally.hits += 1;
        Some(1.0)
    };

    let Some(multiplier) = multiplier else {
        return RolledOutcome {
            tally,
            amount: 0.0,
            landed: false,
        };
    };

    let mut amount = base * multiplier;
    if ability.kind == AbilityKind::Damage
        && ability.block_chance > 0.0
        && rng.gen::<f64>() < ability.block_chance
    {
        tally.blocks += 1;
        amount *= 1.0 - BLOCK_REDUCTION;
    }

    RolledOutcome {
        tally,
        amount,
        landed: true,
    }
}

fn regen_mana(metrics: &mut EncounterMetrics, unit: &mut Combatant, idx: UnitIndex, regen: f64) {
    let Some(mana) = unit.mana else {
        return;
    };
    let actual = regen.min(unit.max_mana - mana).max(0.0);
    unit.mana = Some(mana + actual);
    metrics.record_resource_event(
        idx,
        ActionId::other(MANA_REGEN_ACTION),
        ResourceType::Mana,
        regen,
        actual,
    );
}

/// Extend (or start) an aura and return the uptime it adds, clipped to the encounter.
fn refresh_aura(unit: &mut Combatant, id: i32, now: f64, length: f64, end: f64) -> f64 {
    let new_expiry = (now + length).min(end);
    match unit.auras.iter_mut().find(|(aura, _)| *aura == id) {
        Some((_, expiry)) => {
            let added = (new_expiry - expiry.max(now)).max(0.0);
            *expiry = expiry.max(new_expiry);
            added
        }
        None => {
            unit.auras.push((id, new_expiry));
            new_expiry - now
        }
    }
}

/// Run all iterations on the calling thread
pub fn run_sequential(encounter: &Encounter, options: &RunOptions) -> EncounterMetrics {
    encounter.run_block(options, 0..options.iterations)
}

/// Run iterations across worker threads, one block of iterations per worker
pub fn run_parallel(encounter: &Encounter, options: &RunOptions) -> EncounterMetrics {
    let threads = num_cpus::get().max(1);
    let blocks = threads.min(options.iterations).max(1);
    let block_len = options.iterations.div_ceil(blocks);

    let work = || {
        (0..blocks)
            .into_par_iter()
            .map(|b| {
                let start = (b * block_len).min(options.iterations);
                let end = ((b + 1) * block_len).min(options.iterations);
                tracing::debug!(block = b, start, end, "running iteration block");
                encounter.run_block(options, start..end)
            })
            .collect::<Vec<_>>()
    };

    let partials = match ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(work),
        Err(e) => {
            tracing::warn!(error = %e, "could not build thread pool, using the global one");
            work()
        }
    };

    // Single writer: fold blocks in iteration order.
    let mut merged = encounter.new_metrics();
    for partial in &partials {
        merged.merge(partial);
    }
    merged
}

/// Run the configured iterations and build the report
pub fn run_and_report(config: &EncounterConfig, options: &RunOptions) -> Result<SimReport, SimError> {
    let encounter = Encounter::new(config.clone())?;

    tracing::info!(
        iterations = options.iterations,
        units = config.units.len(),
        parallel = options.parallel,
        seed = options.random_seed,
        "starting simulation"
    );
    let start = Instant::now();

    let metrics = if options.parallel {
        run_parallel(&encounter, options)
    } else {
        run_sequential(&encounter, options)
    };

    tracing::info!(
        iterations = metrics.iterations(),
        workers = if options.parallel { num_cpus::get() } else { 1 },
        elapsed_ms = start.elapsed().as_millis() as u64,
        "simulation finished"
    );

    Ok(metrics.to_report())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuraConfig;

    fn ability(kind: AbilityKind) -> AbilityConfig {
        AbilityConfig {
            id: 1,
            name: None,
            kind,
            target: None,
            interval_secs: 1.0,
            min_amount: 100.0,
            max_amount: 100.0,
            miss_chance: 0.0,
            dodge_chance: 0.0,
            parry_chance: 0.0,
            glance_chance: 0.0,
            crit_chance: 0.0,
            block_chance: 0.0,
            crit_multiplier: 2.0,
            threat_multiplier: 1.0,
            mana_cost: 0.0,
            melee: false,
            cast_time_secs: 0.0,
            aura: None,
        }
    }

    #[test]
    fn event_queue_pops_earliest_first() {
        let mut queue = BinaryHeap::new();
        for (time, priority) in [(3.0, 1), (1.0, 2), (1.0, 1), (2.0, 1)] {
            queue.push(Event {
                time,
                priority,
                action: Action::ManaTick { unit: 0 },
            });
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|e| (e.time, e.priority))
            .collect();
        assert_eq!(order, vec![(1.0, 1), (1.0, 2), (2.0, 1), (3.0, 1)]);
    }

    #[test]
    fn certain_miss_deals_nothing() {
        let mut a = ability(AbilityKind::Damage);
        a.miss_chance = 1.0;
        let mut rng = SmallRng::seed_from_u64(1);
        let out = roll_outcome(&a, &mut rng);
        assert_eq!(out.tally.misses, 1);
        assert_eq!(out.tally.casts, 1);
        assert_eq!(out.amount, 0.0);
        assert!(!out.landed);
    }

    #[test]
    fn certain_crit_multiplies() {
        let mut a = ability(AbilityKind::Damage);
        a.crit_chance = 1.0;
        let mut rng = SmallRng::seed_from_u64(2);
        let out = roll_outcome(&a, &mut rng);
        assert_eq!(out.tally.crits, 1);
        assert_eq!(out.amount, 200.0);
    }

    #[test]
    fn certain_block_reduces_damage() {
        let mut a = ability(AbilityKind::Damage);
        a.block_chance = 1.0;
        let mut rng = SmallRng::seed_from_u64(3);
        let out = roll_outcome(&a, &mut rng);
        assert_eq!(out.tally.hits, 1);
        assert_eq!(out.tally.blocks, 1);
        assert!((out.amount - 70.0).abs() < 1e-9);
    }

    #[test]
    fn aura_refresh_counts_only_new_time() {
        let mut unit = Combatant {
            health: 1.0,
            max_health: 1.0,
            mana: None,
            max_mana: 0.0,
            alive: true,
            auras: Vec::new(),
        };
        assert_eq!(refresh_aura(&mut unit, 5, 10.0, 6.0, 100.0), 6.0);
        // Still active until 16; refreshing at 12 extends to 18.
        assert_eq!(refresh_aura(&mut unit, 5, 12.0, 6.0, 100.0), 2.0);
        // Clipped to encounter end.
        assert_eq!(refresh_aura(&mut unit, 5, 97.0, 6.0, 100.0), 3.0);
    }

    #[test]
    fn aura_config_feeds_uptime() {
        let mut hit = ability(AbilityKind::Damage);
        hit.aura = Some(AuraConfig {
            id: 77,
            duration_secs: 1.0,
            chance: 1.0,
        });
        let config = EncounterConfig {
            duration_secs: 30.0,
            duration_variation_secs: 0.0,
            tmi_bin_secs: 6,
            units: vec![
                crate::config::UnitConfig {
                    name: "a".into(),
                    side: crate::encounter::Side::Raid,
                    health: 100.0,
                    mana: None,
                    mana_regen_per_tick: 0.0,
                    tanking: false,
                    owner: None,
                    abilities: vec![hit],
                },
                crate::config::UnitConfig {
                    name: "dummy".into(),
                    side: crate::encounter::Side::Enemy,
                    health: 1e12,
                    mana: None,
                    mana_regen_per_tick: 0.0,
                    tanking: false,
                    owner: None,
                    abilities: vec![],
                },
            ],
        };
        let encounter = Encounter::new(config).unwrap();
        let options = RunOptions {
            iterations: 3,
            ..Default::default()
        };
        let report = run_sequential(&encounter, &options).to_report();
        let aura = &report.units[0].auras[0];
        assert_eq!(aura.id, ActionId::spell(77));
        // One-second aura refreshed every second: up for almost the whole fight.
        assert!(aura.uptime_seconds_avg > 28.0 && aura.uptime_seconds_avg <= 30.0);
        assert!(aura.procs_avg >= 29.0);
        // 100 damage per second against the dummy.
        assert!((report.units[0].dps.avg - 100.0).abs() < 5.0);
    }
}
