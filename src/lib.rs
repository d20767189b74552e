//! Combat Metrics - statistics aggregation for Monte Carlo combat simulations
//!
//! Folds thousands of encounter iterations into per-combatant distributions
//! (dps, hps, threat, damage taken, TMI, time-to-OOM), per-ability outcome
//! counters, resource and aura summaries, without keeping per-event history.

pub mod action;
pub mod aggregator;
pub mod aura;
pub mod config;
pub mod distribution;
pub mod encounter;
pub mod error;
pub mod report;
pub mod resource;
pub mod simulation;
pub mod tmi;
pub mod unit;

#[cfg(feature = "python")]
mod python;

pub use action::*;
pub use aggregator::*;
pub use aura::*;
pub use config::*;
pub use distribution::*;
pub use encounter::*;
pub use error::SimError;
pub use report::*;
pub use resource::*;
pub use simulation::*;
pub use tmi::*;
pub use unit::*;
