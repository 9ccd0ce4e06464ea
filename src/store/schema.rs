use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::remote::AggregatedGameRecord;
use crate::session::result::PlacementResult;
use crate::store::attempts::BestStats;
use crate::wizard::WizardProgress;

pub const SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlacementLedgerData {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    /// Keyed by `PlacementScope::storage_key`.
    #[serde(default)]
    pub placements: BTreeMap<String, Vec<PlacementResult>>,
}

impl Default for PlacementLedgerData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            placements: BTreeMap::new(),
        }
    }
}

impl PlacementLedgerData {
    pub fn needs_reset(&self) -> bool {
        self.schema_version != SCHEMA_VERSION
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptStatsData {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub games: BTreeMap<String, BestStats>,
}

impl Default for AttemptStatsData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            games: BTreeMap::new(),
        }
    }
}

impl AttemptStatsData {
    pub fn needs_reset(&self) -> bool {
        self.schema_version != SCHEMA_VERSION
    }
}

/// Table backing `LocalBackend`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregateTableData {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub records: Vec<AggregatedGameRecord>,
}

impl Default for AggregateTableData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            records: Vec::new(),
        }
    }
}

/// Wizard rows keyed by user id. Used both as the local backend table and
/// as the offline mirror.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WizardTableData {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub progress: BTreeMap<String, WizardProgress>,
}

impl Default for WizardTableData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            progress: BTreeMap::new(),
        }
    }
}
