//! Per-ability, per-target outcome counters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Position of a combatant within its encounter.
pub type UnitIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKey {
    Spell(i32),
    Item(i32),
    Other(i32),
}

/// Identifies one discrete combatant action for metric bucketing.
///
/// `tag` separates variants of the same spell that should be reported apart
/// (e.g. a chain spell split by bounce count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId {
    pub key: ActionKey,
    #[serde(default)]
    pub tag: i32,
}

impl ActionId {
    pub fn spell(id: i32) -> Self {
        Self { key: ActionKey::Spell(id), tag: 0 }
    }

    pub fn item(id: i32) -> Self {
        Self { key: ActionKey::Item(id), tag: 0 }
    }

    pub fn other(id: i32) -> Self {
        Self { key: ActionKey::Other(id), tag: 0 }
    }

    pub fn with_tag(self, tag: i32) -> Self {
        Self { tag, ..self }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key {
            ActionKey::Spell(id) => write!(f, "spell:{id}")?,
            ActionKey::Item(id) => write!(f, "item:{id}")?,
            ActionKey::Other(id) => write!(f, "other:{id}")?,
        }
        if self.tag != 0 {
            write!(f, "#{}", self.tag)?;
        }
        Ok(())
    }
}

/// Outcome tally of one ability use against one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpellMetrics {
    pub casts: i32,
    pub misses: i32,
    pub hits: i32,
    pub crits: i32,
    pub dodges: i32,
    pub glances: i32,
    pub parries: i32,
    pub blocks: i32,

    pub total_damage: f64,
    pub total_threat: f64,
    pub total_healing: f64,
    pub total_shielding: f64,
    pub total_cast_time: Duration,
}

/// Accumulated outcomes of one ability against one target, over the whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetedActionMetrics {
    pub unit_index: UnitIndex,

    pub casts: i32,
    pub hits: i32,
    pub crits: i32,
    pub misses: i32,
    pub dodges: i32,
    pub parries: i32,
    pub blocks: i32,
    pub glances: i32,

    pub damage: f64,
    pub threat: f64,
    pub healing: f64,
    pub shielding: f64,
    pub cast_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetedActionReport {
    pub unit_index: UnitIndex,
    pub casts: i32,
    pub hits: i32,
    pub crits: i32,
    pub misses: i32,
    pub dodges: i32,
    pub parries: i32,
    pub blocks: i32,
    pub glances: i32,
    pub damage: f64,
    pub threat: f64,
    pub healing: f64,
    pub shielding: f64,
    pub cast_time_ms: f64,
}

impl TargetedActionMetrics {
    fn add(&mut self, m: &SpellMetrics) {
        self.casts += m.casts;
        self.misses += m.misses;
        self.hits += m.hits;
        self.crits += m.crits;
        self.dodges += m.dodges;
        self.parries += m.parries;
        self.blocks += m.blocks;
        self.glances += m.glances;
        self.damage += m.total_damage;
        self.threat += m.total_threat;
        self.healing += m.total_healing;
        self.shielding += m.total_shielding;
        self.cast_time += m.total_cast_time;
    }

    fn merge(&mut self, other: &TargetedActionMetrics) {
        self.casts += other.casts;
        self.misses += other.misses;
        self.hits += other.hits;
        self.crits += other.crits;
        self.dodges += other.dodges;
        self.parries += other.parries;
        self.blocks += other.blocks;
        self.glances += other.glances;
        self.damage += other.damage;
        self.threat += other.threat;
        self.healing += other.healing;
        self.shielding += other.shielding;
        self.cast_time += other.cast_time;
    }

    pub fn to_report(&self) -> TargetedActionReport {
        TargetedActionReport {
            unit_index: self.unit_index,
            casts: self.casts,
            hits: self.hits,
            crits: self.crits,
            misses: self.misses,
            dodges: self.dodges,
            parries: self.parries,
            blocks: self.blocks,
            glances: self.glances,
            damage: self.damage,
            threat: self.threat,
            healing: self.healing,
            shielding: self.shielding,
            cast_time_ms: self.cast_time.as_millis() as f64,
        }
    }
}

/// Metrics for one ability, one entry per possible target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionMetrics {
    /// True for melee actions, false for spells.
    pub is_melee: bool,
    pub targets: Vec<TargetedActionMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub id: ActionId,
    pub is_melee: bool,
    pub targets: Vec<TargetedActionReport>,
}

impl ActionMetrics {
    pub fn new(is_melee: bool) -> Self {
        Self { is_melee, targets: Vec::new() }
    }

    /// Adds one tally per roster entry. The target list is sized on first use;
    /// callers keep the roster stable for the lifetime of the action.
    pub fn add(&mut self, roster: &[UnitIndex], outcomes: &[SpellMetrics]) {
        if self.targets.is_empty() {
            self.targets = roster
                .iter()
                .take(outcomes.len())
                .map(|&unit_index| TargetedActionMetrics {
                    unit_index,
                    ..Default::default()
                })
                .collect();
        }
        debug_assert_eq!(self.targets.len(), outcomes.len(), "target roster changed size");

        for (tam, outcome) in self.targets.iter_mut().zip(outcomes) {
            tam.add(outcome);
        }
    }

    pub fn merge(&mut self, other: &ActionMetrics) {
        if self.targets.is_empty() {
            self.targets = other.targets.clone();
            return;
        }
        for (tam, theirs) in self.targets.iter_mut().zip(&other.targets) {
            tam.merge(theirs);
        }
    }

    pub fn to_report(&self, id: ActionId) -> ActionReport {
        ActionReport {
            id,
            is_melee: self.is_melee,
            targets: self.targets.iter().map(|t| t.to_report()).collect(),
        }
    }
}
