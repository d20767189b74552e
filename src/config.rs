//! Encounter scripts and run options, loaded from YAML or JSON

use crate::action::UnitIndex;
use crate::encounter::{Side, UnitSpec};
use crate::error::SimError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Whether an ability harms its target or restores it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbilityKind {
    Damage,
    Heal,
}

// Custom deserializer for case-insensitive matching
impl<'de> Deserialize<'de> for AbilityKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "damage" => Ok(AbilityKind::Damage),
            "heal" | "healing" => Ok(AbilityKind::Heal),
            _ => Err(serde::de::Error::unknown_variant(
                &s,
                &["damage", "heal", "Damage", "Heal"],
            )),
        }
    }
}

/// Buff applied to the caster when the ability lands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuraConfig {
    pub id: i32,
    pub duration_secs: f64,
    #[serde(default = "one")]
    pub chance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityConfig {
    pub id: i32,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: AbilityKind,
    /// Unit name. Damage defaults to the first opponent, heals to the caster.
    #[serde(default)]
    pub target: Option<String>,
    pub interval_secs: f64,
    pub min_amount: f64,
    pub max_amount: f64,

    // Roll table, checked in this order against one roll.
    #[serde(default)]
    pub miss_chance: f64,
    #[serde(default)]
    pub dodge_chance: f64,
    #[serde(default)]
    pub parry_chance: f64,
    #[serde(default)]
    pub glance_chance: f64,
    #[serde(default)]
    pub crit_chance: f64,
    /// Separate roll on landed hits; a block absorbs part of the damage.
    #[serde(default)]
    pub block_chance: f64,

    #[serde(default = "default_crit_multiplier")]
    pub crit_multiplier: f64,
    #[serde(default = "one")]
    pub threat_multiplier: f64,
    #[serde(default)]
    pub mana_cost: f64,
    #[serde(default)]
    pub melee: bool,
    #[serde(default)]
    pub cast_time_secs: f64,
    #[serde(default)]
    pub aura: Option<AuraConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub side: Side,
    pub health: f64,
    /// Starting and maximum mana; absent for units without a mana bar.
    #[serde(default)]
    pub mana: Option<f64>,
    #[serde(default)]
    pub mana_regen_per_tick: f64,
    #[serde(default)]
    pub tanking: bool,
    /// Name of the owning unit, for pets.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub abilities: Vec<AbilityConfig>,
}

/// A scripted encounter, repeated once per iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterConfig {
    pub duration_secs: f64,
    /// Each iteration's duration is drawn uniformly from `duration ± variation`.
    #[serde(default)]
    pub duration_variation_secs: f64,
    #[serde(default = "default_tmi_bin")]
    pub tmi_bin_secs: u32,
    pub units: Vec<UnitConfig>,
}

/// How many iterations to run and what to keep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub iterations: usize,
    /// Iteration `i` is seeded with `random_seed + i`.
    #[serde(default)]
    pub random_seed: i64,
    #[serde(default)]
    pub save_all_values: bool,
    #[serde(default)]
    pub parallel: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            iterations: 1000,
            random_seed: 0,
            save_all_values: false,
            parallel: false,
        }
    }
}

fn one() -> f64 {
    1.0
}

fn default_crit_multiplier() -> f64 {
    2.0
}

fn default_tmi_bin() -> u32 {
    6
}

impl EncounterConfig {
    /// Load and validate an encounter from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let config: EncounterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, SimError> {
        let config: EncounterConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn unit_index(&self, name: &str) -> Option<UnitIndex> {
        self.units.iter().position(|u| u.name == name)
    }

    fn lookup(&self, unit: &UnitConfig, name: &str) -> Result<UnitIndex, SimError> {
        self.unit_index(name).ok_or_else(|| SimError::UnknownUnit {
            unit: unit.name.clone(),
            target: name.to_string(),
        })
    }

    /// Resolve who an ability lands on.
    pub fn ability_target(
        &self,
        caster: UnitIndex,
        ability: &AbilityConfig,
    ) -> Result<UnitIndex, SimError> {
        let unit = &self.units[caster];
        match (&ability.target, ability.kind) {
            (Some(name), _) => self.lookup(unit, name),
            (None, AbilityKind::Heal) => Ok(caster),
            (None, AbilityKind::Damage) => self
                .units
                .iter()
                .position(|u| u.side != unit.side)
                .ok_or_else(|| {
                    SimError::InvalidConfig(format!(
                        "`{}` has a damage ability but no opponents",
                        unit.name
                    ))
                }),
        }
    }

    /// Static unit descriptions for the metrics layer
    pub fn unit_specs(&self) -> Result<Vec<UnitSpec>, SimError> {
        self.units
            .iter()
            .map(|unit| {
                let owner = unit
                    .owner
                    .as_deref()
                    .map(|name| self.lookup(unit, name))
                    .transpose()?;
                Ok(UnitSpec {
                    name: unit.name.clone(),
                    side: unit.side,
                    owner,
                    tmi_bin: unit.tanking.then_some(self.tmi_bin_secs),
                    reference_health: unit.health,
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let invalid = |msg: String| Err(SimError::InvalidConfig(msg));

        if !(self.duration_secs > 0.0) {
            return invalid(format!("duration_secs must be positive, got {}", self.duration_secs));
        }
        if !(0.0..self.duration_secs).contains(&self.duration_variation_secs) {
            return invalid(format!(
                "duration_variation_secs must be in [0, {}), got {}",
                self.duration_secs, self.duration_variation_secs
            ));
        }
        if self.units.is_empty() {
            return invalid("encounter has no units".to_string());
        }

        let mut names = HashSet::new();
        for unit in &self.units {
            if !names.insert(unit.name.as_str()) {
                return invalid(format!("duplicate unit name `{}`", unit.name));
            }
        }

        for (idx, unit) in self.units.iter().enumerate() {
            if !(unit.health > 0.0) {
                return invalid(format!("`{}` must have positive health", unit.name));
            }
            if unit.mana.is_some_and(|m| m < 0.0) || unit.mana_regen_per_tick < 0.0 {
                return invalid(format!("`{}` has negative mana settings", unit.name));
            }

            if let Some(owner_name) = &unit.owner {
                let owner = &self.units[self.lookup(unit, owner_name)?];
                if owner.name == unit.name || owner.owner.is_some() {
                    return invalid(format!("`{}` cannot be owned by `{}`", unit.name, owner.name));
                }
                if owner.side != unit.side {
                    return invalid(format!("pet `{}` must share its owner's side", unit.name));
                }
            }

            for ability in &unit.abilities {
                self.validate_ability(unit, ability)?;
                self.ability_target(idx, ability)?;
            }
        }

        Ok(())
    }

    fn validate_ability(&self, unit: &UnitConfig, a: &AbilityConfig) -> Result<(), SimError> {
        let fail = |what: &str| {
            Err(SimError::InvalidConfig(format!(
                "`{}` ability {}: {}",
                unit.name, a.id, what
            )))
        };

        if !(a.interval_secs > 0.0) {
            return fail("interval_secs must be positive");
        }
        if !(a.min_amount >= 0.0 && a.min_amount <= a.max_amount) {
            return fail("need 0 <= min_amount <= max_amount");
        }
        let chances = [
            a.miss_chance,
            a.dodge_chance,
            a.parry_chance,
            a.glance_chance,
            a.crit_chance,
            a.block_chance,
        ];
        if chances.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return fail("chances must be within [0, 1]");
        }
        if chances[..5].iter().sum::<f64>() > 1.0 {
            return fail("miss + dodge + parry + glance + crit exceeds 1");
        }
        if a.mana_cost < 0.0 || a.cast_time_secs < 0.0 {
            return fail("mana_cost and cast_time_secs cannot be negative");
        }
        if a.mana_cost > 0.0 && unit.mana.is_none() {
            return fail("costs mana but the unit has no mana bar");
        }
        if let Some(aura) = &a.aura {
            if !(aura.duration_secs > 0.0) || !(0.0..=1.0).contains(&aura.chance) {
                return fail("aura needs a positive duration and a chance within [0, 1]");
            }
        }
        Ok(())
    }
}
