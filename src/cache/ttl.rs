//! Freshness classes and their time-to-live windows.

use std::time::Duration;

use serde::Deserialize;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// How quickly a kind of data goes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessClass {
  /// Updates daily or less (resources, lore)
  StaticDaily,
  /// Skills, spells, classes, professions, technologies
  Mechanics,
  /// Continents, regions, settlements, factions
  Geography,
  /// Population statistics
  Population,
  /// World statistics snapshot
  WorldStats,
  /// Character movement, effectively always refetched
  CharacterLocations,
  /// Online/offline status
  OnlineStatus,
}

/// TTL per freshness class, in seconds. Every field can be overridden from config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
  pub static_daily_secs: u64,
  pub mechanics_secs: u64,
  pub geography_secs: u64,
  pub population_secs: u64,
  pub world_stats_secs: u64,
  pub character_locations_secs: u64,
  pub online_status_secs: u64,
}

impl Default for TtlPolicy {
  fn default() -> Self {
    Self {
      static_daily_secs: 24 * HOUR,
      mechanics_secs: 24 * HOUR,
      geography_secs: 12 * HOUR,
      population_secs: 10 * MINUTE,
      world_stats_secs: 5 * MINUTE,
      character_locations_secs: 30,
      online_status_secs: MINUTE,
    }
  }
}

impl TtlPolicy {
  pub fn ttl(&self, class: FreshnessClass) -> Duration {
    let secs = match class {
      FreshnessClass::StaticDaily => self.static_daily_secs,
      FreshnessClass::Mechanics => self.mechanics_secs,
      FreshnessClass::Geography => self.geography_secs,
      FreshnessClass::Population => self.population_secs,
      FreshnessClass::WorldStats => self.world_stats_secs,
      FreshnessClass::CharacterLocations => self.character_locations_secs,
      FreshnessClass::OnlineStatus => self.online_status_secs,
    };
    Duration::from_secs(secs)
  }
}
