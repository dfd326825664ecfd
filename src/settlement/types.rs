//! Settlement building records.

use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::cache::{Cacheable, CachedRecord, Table, Timestamp};

/// A building as the settlement endpoint returns it.
///
/// Coordinates are optional because partial payloads do occur; how a missing
/// coordinate is treated when comparing layouts is configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementBuilding {
  pub settlement_building_id: Option<i64>,
  pub building_id: i64,
  pub settlement_id: i64,
  pub name: String,
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(rename = "xCoordinate")]
  pub x: Option<f64>,
  #[serde(rename = "yCoordinate")]
  pub y: Option<f64>,
  #[serde(rename = "zCoordinate")]
  pub z: Option<f64>,
  #[serde(default)]
  pub is_destroyed: bool,
  #[serde(default)]
  pub is_damaged: bool,
  #[serde(default)]
  pub is_active: bool,
  pub prefab_path: Option<String>,
  pub prefab_name: Option<String>,
  pub health: Option<f64>,
  pub level: Option<u32>,
  pub workers: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSettlementBuilding {
  #[serde(flatten)]
  pub building: SettlementBuilding,
  pub last_updated: Timestamp,
}

impl CachedSettlementBuilding {
  pub fn new(building: SettlementBuilding, now: Timestamp) -> Self {
    Self {
      building,
      last_updated: now,
    }
  }
}

impl Cacheable for CachedSettlementBuilding {
  fn record_id(&self) -> String {
    format!(
      "{}-{}",
      self.building.settlement_id, self.building.building_id
    )
  }

  fn table() -> Table {
    Table::SettlementBuildings
  }
}

impl CachedRecord for CachedSettlementBuilding {
  type Remote = SettlementBuilding;

  fn restore(self) -> Result<SettlementBuilding> {
    Ok(self.building)
  }
}
