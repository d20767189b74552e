//! Run-level report

use crate::unit::UnitReport;
use serde::{Deserialize, Serialize};

/// Everything a finished run produces, ready for any serde format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimReport {
    pub iterations: u64,
    pub duration_secs_avg: f64,
    pub duration_secs_stdev: f64,
    pub units: Vec<UnitReport>,
}

impl SimReport {
    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn to_json(&self) -> Result<String, crate::error::SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
