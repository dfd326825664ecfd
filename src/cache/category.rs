//! Data categories and the store tables that back them.

use std::fmt;
use std::str::FromStr;

use color_eyre::{eyre::eyre, Report};

/// Freshness/maintenance grouping recorded in metadata entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
  Mechanics,
  Geography,
  Factions,
  Resources,
  Lore,
  Statistics,
}

impl Category {
  pub const ALL: [Category; 6] = [
    Category::Mechanics,
    Category::Geography,
    Category::Factions,
    Category::Resources,
    Category::Lore,
    Category::Statistics,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Mechanics => "mechanics",
      Self::Geography => "geography",
      Self::Factions => "factions",
      Self::Resources => "resources",
      Self::Lore => "lore",
      Self::Statistics => "statistics",
    }
  }

  /// Tables cleared when this category is cleared.
  pub fn tables(&self) -> &'static [Table] {
    match self {
      Self::Mechanics => &[
        Table::CharacterClasses,
        Table::Skills,
        Table::Spells,
        Table::Professions,
        Table::Technologies,
      ],
      Self::Geography => &[Table::Continents, Table::Regions, Table::Settlements],
      Self::Factions => &[Table::Factions],
      Self::Resources => &[Table::Resources],
      Self::Lore => &[Table::LoreEntries],
      Self::Statistics => &[Table::WorldStatistics],
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Category {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Category::ALL
      .into_iter()
      .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| eyre!("Unknown cache category: {}", s))
  }
}

/// One category table in the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
  CharacterClasses,
  Skills,
  Spells,
  Professions,
  Technologies,
  Continents,
  Regions,
  Settlements,
  Resources,
  Factions,
  LoreEntries,
  WorldStatistics,
  SettlementBuildings,
}

impl Table {
  pub const ALL: [Table; 13] = [
    Table::CharacterClasses,
    Table::Skills,
    Table::Spells,
    Table::Professions,
    Table::Technologies,
    Table::Continents,
    Table::Regions,
    Table::Settlements,
    Table::Resources,
    Table::Factions,
    Table::LoreEntries,
    Table::WorldStatistics,
    Table::SettlementBuildings,
  ];

  /// SQL table name. Only ever interpolated from this fixed set.
  pub fn name(&self) -> &'static str {
    match self {
      Self::CharacterClasses => "character_classes",
      Self::Skills => "skills",
      Self::Spells => "spells",
      Self::Professions => "professions",
      Self::Technologies => "technologies",
      Self::Continents => "continents",
      Self::Regions => "regions",
      Self::Settlements => "settlements",
      Self::Resources => "resources",
      Self::Factions => "factions",
      Self::LoreEntries => "lore_entries",
      Self::WorldStatistics => "world_statistics",
      Self::SettlementBuildings => "settlement_buildings",
    }
  }
}
