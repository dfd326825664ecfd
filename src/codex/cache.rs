//! Caching implementations for codex types.

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::cache::{CacheKey, Cacheable, CachedRecord, Category, FreshnessClass, Table, Timestamp};

use super::types::{
  CharacterClass, Continent, Faction, LoreEntry, Profession, Region, Resource, Settlement, Skill,
  Spell, Technology, WorldStatistics,
};

// ============================================================================
// Blob helpers
// ============================================================================

/// Nested structures are stored as opaque JSON strings.
fn to_blob<T: Serialize>(value: &T) -> Result<String> {
  serde_json::to_string(value).map_err(|e| eyre!("Failed to encode nested field: {}", e))
}

fn to_opt_blob<T: Serialize>(value: &Option<T>) -> Result<Option<String>> {
  value.as_ref().map(to_blob::<T>).transpose()
}

fn from_blob<T: DeserializeOwned>(blob: &str) -> Result<T> {
  serde_json::from_str(blob).map_err(|e| eyre!("Failed to decode nested field: {}", e))
}

fn from_opt_blob<T: DeserializeOwned>(blob: Option<&str>) -> Result<Option<T>> {
  blob.map(from_blob::<T>).transpose()
}

fn to_millis(at: Option<DateTime<Utc>>) -> Option<Timestamp> {
  at.map(|at| at.timestamp_millis())
}

fn from_millis(millis: Option<Timestamp>) -> Result<Option<DateTime<Utc>>> {
  millis
    .map(|ms| {
      Utc
        .timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| eyre!("Invalid stored timestamp: {}", ms))
    })
    .transpose()
}

// ============================================================================
// Cached shapes and mappers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCharacterClass {
  pub name: String,
  pub description: Option<String>,
  pub primary_stats: Option<String>,
  pub abilities: Option<String>,
  pub count: Option<u32>,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedCharacterClass {
  fn record_id(&self) -> String {
    // Classes carry no id; the name is unique
    self.name.clone()
  }

  fn table() -> Table {
    Table::CharacterClasses
  }
}

impl CachedRecord for CachedCharacterClass {
  type Remote = CharacterClass;

  fn restore(self) -> Result<CharacterClass> {
    Ok(CharacterClass {
      primary_stats: from_opt_blob(self.primary_stats.as_deref())?,
      abilities: from_opt_blob(self.abilities.as_deref())?,
      name: self.name,
      description: self.description,
      count: self.count,
    })
  }
}

pub fn map_character_class(class: &CharacterClass, now: Timestamp) -> Result<CachedCharacterClass> {
  Ok(CachedCharacterClass {
    name: class.name.clone(),
    description: class.description.clone(),
    primary_stats: to_opt_blob(&class.primary_stats)?,
    abilities: to_opt_blob(&class.abilities)?,
    count: class.count,
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSkill {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub category: String,
  pub max_level: Option<u32>,
  pub prerequisites: Option<String>,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedSkill {
  fn record_id(&self) -> String {
    self.id.to_string()
  }

  fn table() -> Table {
    Table::Skills
  }
}

impl CachedRecord for CachedSkill {
  type Remote = Skill;

  fn restore(self) -> Result<Skill> {
    Ok(Skill {
      prerequisites: from_opt_blob(self.prerequisites.as_deref())?,
      id: self.id,
      name: self.name,
      description: self.description,
      category: self.category,
      max_level: self.max_level,
    })
  }
}

pub fn map_skill(skill: &Skill, now: Timestamp) -> Result<CachedSkill> {
  Ok(CachedSkill {
    id: skill.id,
    name: skill.name.clone(),
    description: skill.description.clone(),
    category: skill.category.clone(),
    max_level: skill.max_level,
    prerequisites: to_opt_blob(&skill.prerequisites)?,
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSpell {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub school: String,
  pub level: u32,
  pub components: String,
  pub casting_time: String,
  pub range: String,
  pub duration: String,
  pub effect: String,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedSpell {
  fn record_id(&self) -> String {
    self.id.to_string()
  }

  fn table() -> Table {
    Table::Spells
  }
}

impl CachedRecord for CachedSpell {
  type Remote = Spell;

  fn restore(self) -> Result<Spell> {
    Ok(Spell {
      components: from_blob(&self.components)?,
      id: self.id,
      name: self.name,
      description: self.description,
      school: self.school,
      level: self.level,
      casting_time: self.casting_time,
      range: self.range,
      duration: self.duration,
      effect: self.effect,
    })
  }
}

pub fn map_spell(spell: &Spell, now: Timestamp) -> Result<CachedSpell> {
  Ok(CachedSpell {
    id: spell.id,
    name: spell.name.clone(),
    description: spell.description.clone(),
    school: spell.school.clone(),
    level: spell.level,
    components: to_blob(&spell.components)?,
    casting_time: spell.casting_time.clone(),
    range: spell.range.clone(),
    duration: spell.duration.clone(),
    effect: spell.effect.clone(),
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedProfession {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub required_skills: String,
  pub benefits: String,
  pub unlock_conditions: Option<String>,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedProfession {
  fn record_id(&self) -> String {
    self.id.to_string()
  }

  fn table() -> Table {
    Table::Professions
  }
}

impl CachedRecord for CachedProfession {
  type Remote = Profession;

  fn restore(self) -> Result<Profession> {
    Ok(Profession {
      required_skills: from_blob(&self.required_skills)?,
      benefits: from_blob(&self.benefits)?,
      unlock_conditions: from_opt_blob(self.unlock_conditions.as_deref())?,
      id: self.id,
      name: self.name,
      description: self.description,
    })
  }
}

pub fn map_profession(profession: &Profession, now: Timestamp) -> Result<CachedProfession> {
  Ok(CachedProfession {
    id: profession.id,
    name: profession.name.clone(),
    description: profession.description.clone(),
    required_skills: to_blob(&profession.required_skills)?,
    benefits: to_blob(&profession.benefits)?,
    unlock_conditions: to_opt_blob(&profession.unlock_conditions)?,
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTechnology {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub category: String,
  pub requirements: String,
  pub unlocks: String,
  pub research_cost: Option<u32>,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedTechnology {
  fn record_id(&self) -> String {
    self.id.to_string()
  }

  fn table() -> Table {
    Table::Technologies
  }
}

impl CachedRecord for CachedTechnology {
  type Remote = Technology;

  fn restore(self) -> Result<Technology> {
    Ok(Technology {
      requirements: from_blob(&self.requirements)?,
      unlocks: from_blob(&self.unlocks)?,
      id: self.id,
      name: self.name,
      description: self.description,
      category: self.category,
      research_cost: self.research_cost,
    })
  }
}

pub fn map_technology(tech: &Technology, now: Timestamp) -> Result<CachedTechnology> {
  Ok(CachedTechnology {
    id: tech.id,
    name: tech.name.clone(),
    description: tech.description.clone(),
    category: tech.category.clone(),
    requirements: to_blob(&tech.requirements)?,
    unlocks: to_blob(&tech.unlocks)?,
    research_cost: tech.research_cost,
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedContinent {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub climate: Option<String>,
  pub major_features: Option<String>,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedContinent {
  fn record_id(&self) -> String {
    self.id.to_string()
  }

  fn table() -> Table {
    Table::Continents
  }
}

impl CachedRecord for CachedContinent {
  type Remote = Continent;

  fn restore(self) -> Result<Continent> {
    Ok(Continent {
      major_features: from_opt_blob(self.major_features.as_deref())?,
      id: self.id,
      name: self.name,
      description: self.description,
      climate: self.climate,
    })
  }
}

pub fn map_continent(continent: &Continent, now: Timestamp) -> Result<CachedContinent> {
  Ok(CachedContinent {
    id: continent.id,
    name: continent.name.clone(),
    description: continent.description.clone(),
    climate: continent.climate.clone(),
    major_features: to_opt_blob(&continent.major_features)?,
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRegion {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub continent_id: i64,
  pub climate: Option<String>,
  pub resources: Option<String>,
  pub settlements: Option<u32>,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedRegion {
  fn record_id(&self) -> String {
    self.id.to_string()
  }

  fn table() -> Table {
    Table::Regions
  }
}

impl CachedRecord for CachedRegion {
  type Remote = Region;

  fn restore(self) -> Result<Region> {
    Ok(Region {
      resources: from_opt_blob(self.resources.as_deref())?,
      id: self.id,
      name: self.name,
      description: self.description,
      continent_id: self.continent_id,
      climate: self.climate,
      settlements: self.settlements,
    })
  }
}

pub fn map_region(region: &Region, now: Timestamp) -> Result<CachedRegion> {
  Ok(CachedRegion {
    id: region.id,
    name: region.name.clone(),
    description: region.description.clone(),
    continent_id: region.continent_id,
    climate: region.climate.clone(),
    resources: to_opt_blob(&region.resources)?,
    settlements: region.settlements,
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSettlement {
  pub id: String,
  pub name: String,
  pub kind: String,
  pub population: u64,
  pub faction_id: Option<String>,
  pub faction_name: Option<String>,
  pub region_id: Option<i64>,
  pub region_name: Option<String>,
  pub description: Option<String>,
  pub founded: Option<Timestamp>,
  pub is_capital: Option<bool>,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedSettlement {
  fn record_id(&self) -> String {
    self.id.clone()
  }

  fn table() -> Table {
    Table::Settlements
  }
}

impl CachedRecord for CachedSettlement {
  type Remote = Settlement;

  fn restore(self) -> Result<Settlement> {
    Ok(Settlement {
      founded: from_millis(self.founded)?,
      id: self.id,
      name: self.name,
      kind: self.kind,
      population: self.population,
      faction_id: self.faction_id,
      faction_name: self.faction_name,
      region_id: self.region_id,
      region_name: self.region_name,
      description: self.description,
      is_capital: self.is_capital,
    })
  }
}

pub fn map_settlement(settlement: &Settlement, now: Timestamp) -> Result<CachedSettlement> {
  Ok(CachedSettlement {
    id: settlement.id.clone(),
    name: settlement.name.clone(),
    kind: settlement.kind.clone(),
    population: settlement.population,
    faction_id: settlement.faction_id.clone(),
    faction_name: settlement.faction_name.clone(),
    region_id: settlement.region_id,
    region_name: settlement.region_name.clone(),
    description: settlement.description.clone(),
    founded: to_millis(settlement.founded),
    is_capital: settlement.is_capital,
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFaction {
  pub id: String,
  pub name: String,
  pub description: String,
  pub color: Option<String>,
  pub ideology: Option<String>,
  pub leader: Option<String>,
  pub member_count: Option<u32>,
  pub settlement_count: Option<u32>,
  pub territory: Option<String>,
  pub allies: Option<String>,
  pub enemies: Option<String>,
  pub founded: Option<Timestamp>,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedFaction {
  fn record_id(&self) -> String {
    self.id.clone()
  }

  fn table() -> Table {
    Table::Factions
  }
}

impl CachedRecord for CachedFaction {
  type Remote = Faction;

  fn restore(self) -> Result<Faction> {
    Ok(Faction {
      territory: from_opt_blob(self.territory.as_deref())?,
      allies: from_opt_blob(self.allies.as_deref())?,
      enemies: from_opt_blob(self.enemies.as_deref())?,
      founded: from_millis(self.founded)?,
      id: self.id,
      name: self.name,
      description: self.description,
      color: self.color,
      ideology: self.ideology,
      leader: self.leader,
      member_count: self.member_count,
      settlement_count: self.settlement_count,
    })
  }
}

pub fn map_faction(faction: &Faction, now: Timestamp) -> Result<CachedFaction> {
  Ok(CachedFaction {
    id: faction.id.clone(),
    name: faction.name.clone(),
    description: faction.description.clone(),
    color: faction.color.clone(),
    ideology: faction.ideology.clone(),
    leader: faction.leader.clone(),
    member_count: faction.member_count,
    settlement_count: faction.settlement_count,
    territory: to_opt_blob(&faction.territory)?,
    allies: to_opt_blob(&faction.allies)?,
    enemies: to_opt_blob(&faction.enemies)?,
    founded: to_millis(faction.founded),
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResource {
  pub id: i64,
  pub name: String,
  pub kind: String,
  pub description: String,
  pub rarity: String,
  pub locations: Option<String>,
  pub uses: Option<String>,
  pub value: Option<u32>,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedResource {
  fn record_id(&self) -> String {
    self.id.to_string()
  }

  fn table() -> Table {
    Table::Resources
  }
}

impl CachedRecord for CachedResource {
  type Remote = Resource;

  fn restore(self) -> Result<Resource> {
    Ok(Resource {
      locations: from_opt_blob(self.locations.as_deref())?,
      uses: from_opt_blob(self.uses.as_deref())?,
      id: self.id,
      name: self.name,
      kind: self.kind,
      description: self.description,
      rarity: self.rarity,
      value: self.value,
    })
  }
}

pub fn map_resource(resource: &Resource, now: Timestamp) -> Result<CachedResource> {
  Ok(CachedResource {
    id: resource.id,
    name: resource.name.clone(),
    kind: resource.kind.clone(),
    description: resource.description.clone(),
    rarity: resource.rarity.clone(),
    locations: to_opt_blob(&resource.locations)?,
    uses: to_opt_blob(&resource.uses)?,
    value: resource.value,
    last_updated: now,
  })
}

/// Identity of the world statistics singleton.
pub const WORLD_STATISTICS_ID: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedWorldStatistics {
  pub id: i64,
  pub total_characters: u64,
  pub total_classes: u32,
  pub online_players: u64,
  pub total_settlements: u32,
  pub active_battles: u32,
  pub total_factions: u32,
  pub total_guilds: u32,
  /// Opaque JSON, never queried
  pub world_time: String,
  pub server_uptime: String,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedWorldStatistics {
  fn record_id(&self) -> String {
    self.id.to_string()
  }

  fn table() -> Table {
    Table::WorldStatistics
  }
}

impl CachedRecord for CachedWorldStatistics {
  type Remote = WorldStatistics;

  fn restore(self) -> Result<WorldStatistics> {
    Ok(WorldStatistics {
      world_time: from_blob(&self.world_time)?,
      total_characters: self.total_characters,
      total_classes: self.total_classes,
      online_players: self.online_players,
      total_settlements: self.total_settlements,
      active_battles: self.active_battles,
      total_factions: self.total_factions,
      total_guilds: self.total_guilds,
      server_uptime: self.server_uptime,
    })
  }
}

pub fn map_world_statistics(
  stats: &WorldStatistics,
  now: Timestamp,
) -> Result<CachedWorldStatistics> {
  Ok(CachedWorldStatistics {
    id: WORLD_STATISTICS_ID,
    total_characters: stats.total_characters,
    total_classes: stats.total_classes,
    online_players: stats.online_players,
    total_settlements: stats.total_settlements,
    active_battles: stats.active_battles,
    total_factions: stats.total_factions,
    total_guilds: stats.total_guilds,
    world_time: to_blob(&stats.world_time)?,
    server_uptime: stats.server_uptime.clone(),
    last_updated: now,
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedLoreEntry {
  #[serde(flatten)]
  pub entry: LoreEntry,
  pub last_updated: Timestamp,
}

impl Cacheable for CachedLoreEntry {
  fn record_id(&self) -> String {
    self.entry.id.clone()
  }

  fn table() -> Table {
    Table::LoreEntries
  }
}

impl CachedRecord for CachedLoreEntry {
  type Remote = LoreEntry;

  fn restore(self) -> Result<LoreEntry> {
    Ok(self.entry)
  }
}

// ============================================================================
// Cache keys
// ============================================================================

/// Slot holding every lore entry.
pub const LORE_SLOT: &str = "lore";

/// Cache keys for codex data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodexKey {
  CharacterClasses,
  Skills,
  Spells,
  Professions,
  Technologies,
  Continents,
  /// Regions, optionally of one continent
  Regions { continent_id: Option<i64> },
  /// Settlements, optionally filtered by region and faction
  Settlements {
    region_id: Option<i64>,
    faction_id: Option<String>,
  },
  /// One settlement's detail record
  Settlement { id: String },
  Factions,
  Resources,
  WorldStatistics,
  /// Freshness marker for a manually stored lore entry
  Lore { id: String },
  LoreBulkImport,
}

impl CodexKey {
  pub fn freshness(&self) -> FreshnessClass {
    match self {
      Self::CharacterClasses
      | Self::Skills
      | Self::Spells
      | Self::Professions
      | Self::Technologies => FreshnessClass::Mechanics,
      Self::Continents
      | Self::Regions { .. }
      | Self::Settlements { .. }
      | Self::Settlement { .. }
      | Self::Factions => FreshnessClass::Geography,
      Self::Resources | Self::Lore { .. } | Self::LoreBulkImport => FreshnessClass::StaticDaily,
      Self::WorldStatistics => FreshnessClass::WorldStats,
    }
  }
}

impl CacheKey for CodexKey {
  fn cache_key(&self) -> String {
    match self {
      Self::CharacterClasses => "character-classes".to_string(),
      Self::Skills => "skills".to_string(),
      Self::Spells => "spells".to_string(),
      Self::Professions => "professions".to_string(),
      Self::Technologies => "technologies".to_string(),
      Self::Continents => "continents".to_string(),
      Self::Regions { continent_id } => match continent_id {
        Some(id) => format!("regions-{}", id),
        None => "regions-all".to_string(),
      },
      Self::Settlements {
        region_id,
        faction_id,
      } => match (region_id, faction_id.as_deref().map(str::trim)) {
        (None, None) | (None, Some("")) => "settlements-all".to_string(),
        (region, faction) => format!(
          "settlements-{}-{}",
          region.map(|r| r.to_string()).unwrap_or_else(|| "all".to_string()),
          faction.filter(|f| !f.is_empty()).unwrap_or("all")
        ),
      },
      Self::Settlement { id } => format!("settlement-{}", id),
      Self::Factions => "factions".to_string(),
      Self::Resources => "resources".to_string(),
      Self::WorldStatistics => "world-statistics".to_string(),
      Self::Lore { id } => format!("lore-{}", id),
      Self::LoreBulkImport => "lore-bulk-import".to_string(),
    }
  }

  fn category(&self) -> Category {
    match self {
      Self::CharacterClasses
      | Self::Skills
      | Self::Spells
      | Self::Professions
      | Self::Technologies => Category::Mechanics,
      Self::Continents
      | Self::Regions { .. }
      | Self::Settlements { .. }
      | Self::Settlement { .. } => Category::Geography,
      Self::Factions => Category::Factions,
      Self::Resources => Category::Resources,
      Self::WorldStatistics => Category::Statistics,
      Self::Lore { .. } | Self::LoreBulkImport => Category::Lore,
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Regions {
        continent_id: Some(id),
      } => format!("regions of continent {}", id),
      Self::Settlements {
        region_id,
        faction_id,
      } => match (region_id, faction_id) {
        (None, None) => "all settlements".to_string(),
        (region, faction) => format!(
          "settlements (region {}, faction {})",
          region.map(|r| r.to_string()).unwrap_or_else(|| "any".to_string()),
          faction.as_deref().unwrap_or("any")
        ),
      },
      Self::Settlement { id } => format!("settlement {}", id),
      Self::Lore { id } => format!("lore entry {}", id),
      other => other.cache_key().replace('-', " "),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codex::types::WorldTime;

  #[test]
  fn test_settlement_keys_are_canonical() {
    let all = CodexKey::Settlements {
      region_id: None,
      faction_id: None,
    };
    let blank_faction = CodexKey::Settlements {
      region_id: None,
      faction_id: Some(" ".to_string()),
    };
    let filtered = CodexKey::Settlements {
      region_id: Some(7),
      faction_id: None,
    };

    assert_eq!(all.cache_key(), "settlements-all");
    assert_eq!(blank_faction.cache_key(), "settlements-all");
    assert_eq!(filtered.cache_key(), "settlements-7-all");
    assert_eq!(
      CodexKey::Settlements {
        region_id: Some(7),
        faction_id: Some("iron-pact".to_string()),
      }
      .cache_key(),
      "settlements-7-iron-pact"
    );
  }

  #[test]
  fn test_region_keys_and_categories() {
    assert_eq!(
      CodexKey::Regions {
        continent_id: Some(3)
      }
      .cache_key(),
      "regions-3"
    );
    assert_eq!(CodexKey::Regions { continent_id: None }.cache_key(), "regions-all");
    assert_eq!(CodexKey::Factions.category(), Category::Factions);
    assert_eq!(CodexKey::Factions.freshness(), FreshnessClass::Geography);
    assert_eq!(CodexKey::WorldStatistics.category(), Category::Statistics);
  }

  #[test]
  fn test_nested_fields_survive_the_cache_shape() {
    let faction = Faction {
      id: "iron-pact".to_string(),
      name: "Iron Pact".to_string(),
      description: "Smiths and soldiers".to_string(),
      color: Some("#777".to_string()),
      ideology: None,
      leader: Some("Mara".to_string()),
      member_count: Some(120),
      settlement_count: Some(4),
      territory: Some(vec!["Ashen Vale".to_string()]),
      allies: None,
      enemies: Some(vec!["sun-court".to_string()]),
      founded: Utc.timestamp_millis_opt(1_600_000_000_000).single(),
    };

    let cached = map_faction(&faction, 42).unwrap();
    assert_eq!(cached.territory.as_deref(), Some(r#"["Ashen Vale"]"#));
    assert_eq!(cached.allies, None);
    assert_eq!(cached.last_updated, 42);
    assert_eq!(cached.restore().unwrap(), faction);
  }

  #[test]
  fn test_world_statistics_singleton_identity() {
    let stats = WorldStatistics {
      total_characters: 1200,
      total_classes: 9,
      online_players: 48,
      total_settlements: 30,
      active_battles: 2,
      total_factions: 5,
      total_guilds: 11,
      world_time: WorldTime {
        current_day: 12,
        time_of_day: 0.5,
        season: "Winter".to_string(),
        year: 3,
        server_time: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
      },
      server_uptime: "3d 4h".to_string(),
    };

    let cached = map_world_statistics(&stats, 0).unwrap();
    assert_eq!(cached.record_id(), "1");
    assert!(cached.world_time.contains("Winter"));
    assert_eq!(cached.restore().unwrap(), stats);
  }

  #[test]
  fn test_corrupt_blob_is_an_error() {
    let cached = CachedSpell {
      id: 1,
      name: "Spark".to_string(),
      description: String::new(),
      school: "Evocation".to_string(),
      level: 1,
      components: "not json".to_string(),
      casting_time: "1 action".to_string(),
      range: "30 ft".to_string(),
      duration: "instant".to_string(),
      effect: "1d4".to_string(),
      last_updated: 0,
    };
    assert!(cached.restore().is_err());
  }
}
