//! Codex records as the game server returns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterClass {
  pub name: String,
  pub description: Option<String>,
  pub primary_stats: Option<Vec<String>>,
  pub abilities: Option<Vec<String>>,
  /// Number of characters with this class
  pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub category: String,
  pub max_level: Option<u32>,
  pub prerequisites: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spell {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub school: String,
  pub level: u32,
  #[serde(default)]
  pub components: Vec<String>,
  pub casting_time: String,
  pub range: String,
  pub duration: String,
  pub effect: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profession {
  pub id: i64,
  pub name: String,
  pub description: String,
  #[serde(default)]
  pub required_skills: Vec<String>,
  #[serde(default)]
  pub benefits: Vec<String>,
  pub unlock_conditions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Technology {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub category: String,
  #[serde(default)]
  pub requirements: Vec<String>,
  #[serde(default)]
  pub unlocks: Vec<String>,
  pub research_cost: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Continent {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub climate: Option<String>,
  pub major_features: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub continent_id: i64,
  pub climate: Option<String>,
  pub resources: Option<Vec<String>>,
  /// Count of settlements
  pub settlements: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
  pub id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub population: u64,
  pub faction_id: Option<String>,
  pub faction_name: Option<String>,
  pub region_id: Option<i64>,
  pub region_name: Option<String>,
  pub description: Option<String>,
  pub founded: Option<DateTime<Utc>>,
  pub is_capital: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faction {
  pub id: String,
  pub name: String,
  pub description: String,
  pub color: Option<String>,
  pub ideology: Option<String>,
  pub leader: Option<String>,
  pub member_count: Option<u32>,
  pub settlement_count: Option<u32>,
  pub territory: Option<Vec<String>>,
  pub allies: Option<Vec<String>>,
  pub enemies: Option<Vec<String>>,
  pub founded: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
  pub id: i64,
  pub name: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub description: String,
  pub rarity: String,
  pub locations: Option<Vec<String>>,
  pub uses: Option<Vec<String>>,
  pub value: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldTime {
  pub current_day: u32,
  pub time_of_day: f64,
  pub season: String,
  pub year: i32,
  pub server_time: DateTime<Utc>,
}

/// Point-in-time world aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldStatistics {
  pub total_characters: u64,
  pub total_classes: u32,
  pub online_players: u64,
  pub total_settlements: u32,
  pub active_battles: u32,
  pub total_factions: u32,
  pub total_guilds: u32,
  pub world_time: WorldTime,
  pub server_uptime: String,
}

/// Manually entered lore; never fetched from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoreEntry {
  pub id: String,
  pub title: String,
  pub category: String,
  pub subcategory: Option<String>,
  pub content: String,
  pub summary: String,
  pub tags: Option<String>,
}

impl LoreEntry {
  /// Case-insensitive match over title, content, summary and tags.
  pub fn matches(&self, query: &str) -> bool {
    let query = query.to_lowercase();
    self.title.to_lowercase().contains(&query)
      || self.content.to_lowercase().contains(&query)
      || self.summary.to_lowercase().contains(&query)
      || self
        .tags
        .as_ref()
        .is_some_and(|tags| tags.to_lowercase().contains(&query))
  }
}
