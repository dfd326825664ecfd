//! Structural comparison of building layouts.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::types::SettlementBuilding;

/// How a coordinate absent from the fresh payload is compared.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingFieldPolicy {
  /// Keep the cached value; absence alone is not a change
  #[default]
  Ignore,
  /// Absence of a value that was cached counts as a modification
  Changed,
}

/// Added, removed and modified building counts between two layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutDiff {
  pub added: usize,
  pub removed: usize,
  pub modified: usize,
}

impl LayoutDiff {
  pub fn is_empty(&self) -> bool {
    self.added == 0 && self.removed == 0 && self.modified == 0
  }
}

impl fmt::Display for LayoutDiff {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      return write!(f, "no changes");
    }

    let parts: Vec<String> = [
      (self.added, "added"),
      (self.removed, "removed"),
      (self.modified, "modified"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{} {}", count, label))
    .collect();

    write!(f, "{}", parts.join(", "))
  }
}

fn coordinate_differs(cached: Option<f64>, fresh: Option<f64>, policy: MissingFieldPolicy) -> bool {
  match (cached, fresh) {
    (Some(old), Some(new)) => old != new,
    (None, None) => false,
    (None, Some(_)) => true,
    (Some(_), None) => policy == MissingFieldPolicy::Changed,
  }
}

/// True if any of the fields that affect the rendered layout differ.
pub fn building_differs(
  cached: &SettlementBuilding,
  fresh: &SettlementBuilding,
  policy: MissingFieldPolicy,
) -> bool {
  coordinate_differs(cached.x, fresh.x, policy)
    || coordinate_differs(cached.y, fresh.y, policy)
    || coordinate_differs(cached.z, fresh.z, policy)
    || cached.is_active != fresh.is_active
    || cached.is_damaged != fresh.is_damaged
    || cached.is_destroyed != fresh.is_destroyed
    || cached.name != fresh.name
}

/// Compare two layouts by building id.
pub fn diff_layouts(
  cached: &[SettlementBuilding],
  fresh: &[SettlementBuilding],
  policy: MissingFieldPolicy,
) -> LayoutDiff {
  let cached_by_id: HashMap<i64, &SettlementBuilding> =
    cached.iter().map(|b| (b.building_id, b)).collect();
  let fresh_ids: HashSet<i64> = fresh.iter().map(|b| b.building_id).collect();

  let mut diff = LayoutDiff {
    removed: cached_by_id
      .keys()
      .filter(|id| !fresh_ids.contains(id))
      .count(),
    ..LayoutDiff::default()
  };

  for building in fresh {
    match cached_by_id.get(&building.building_id) {
      None => diff.added += 1,
      Some(old) if building_differs(old, building, policy) => diff.modified += 1,
      Some(_) => {}
    }
  }

  diff
}

/// Collapse buildings sharing an id, keeping the last one at the position of
/// the first. The store keys rows by building id, so this is the layout it
/// ends up holding.
pub fn dedupe_by_id(buildings: Vec<SettlementBuilding>) -> Vec<SettlementBuilding> {
  let mut index: HashMap<i64, usize> = HashMap::with_capacity(buildings.len());
  let mut unique: Vec<SettlementBuilding> = Vec::with_capacity(buildings.len());

  for building in buildings {
    match index.get(&building.building_id) {
      Some(&at) => unique[at] = building,
      None => {
        index.insert(building.building_id, unique.len());
        unique.push(building);
      }
    }
  }
  unique
}

/// Fill coordinates missing from `fresh` with the cached values.
///
/// Applied before persisting under [`MissingFieldPolicy::Ignore`] so a
/// partial payload never erases a known position.
pub fn fill_missing(cached: &[SettlementBuilding], fresh: &mut [SettlementBuilding]) {
  let cached_by_id: HashMap<i64, &SettlementBuilding> =
    cached.iter().map(|b| (b.building_id, b)).collect();

  for building in fresh.iter_mut() {
    if let Some(old) = cached_by_id.get(&building.building_id) {
      building.x = building.x.or(old.x);
      building.y = building.y.or(old.y);
      building.z = building.z.or(old.z);
    }
  }
}

/// Stable fingerprint of a layout's key fields, independent of order.
pub fn layout_fingerprint(buildings: &[SettlementBuilding]) -> String {
  let mut sorted: Vec<&SettlementBuilding> = buildings.iter().collect();
  sorted.sort_by_key(|b| b.building_id);

  let mut hasher = Sha256::new();
  for b in sorted {
    let line = format!(
      "{}|{}|{:?}|{:?}|{:?}|{}|{}|{}\n",
      b.building_id, b.name, b.x, b.y, b.z, b.is_active, b.is_damaged, b.is_destroyed
    );
    hasher.update(line.as_bytes());
  }
  hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) fn building(id: i64, x: f64, y: f64, active: bool) -> SettlementBuilding {
    SettlementBuilding {
      settlement_building_id: None,
      building_id: id,
      settlement_id: 21,
      name: format!("Building {}", id),
      kind: "house".to_string(),
      x: Some(x),
      y: Some(y),
      z: Some(0.0),
      is_destroyed: false,
      is_damaged: false,
      is_active: active,
      prefab_path: None,
      prefab_name: None,
      health: None,
      level: None,
      workers: None,
    }
  }

  #[test]
  fn test_status_flip_is_a_modification() {
    let cached = vec![building(5, 10.0, 20.0, true)];
    let fresh = vec![building(5, 10.0, 20.0, false)];

    let diff = diff_layouts(&cached, &fresh, MissingFieldPolicy::Ignore);
    assert_eq!(
      diff,
      LayoutDiff {
        added: 0,
        removed: 0,
        modified: 1
      }
    );
    assert_eq!(diff.to_string(), "1 modified");
  }

  #[test]
  fn test_added_and_removed_counts() {
    let cached = vec![building(1, 0.0, 0.0, true), building(2, 0.0, 0.0, true)];
    let fresh = vec![
      building(2, 0.0, 0.0, true),
      building(3, 1.0, 1.0, true),
      building(4, 2.0, 2.0, true),
    ];

    let diff = diff_layouts(&cached, &fresh, MissingFieldPolicy::Ignore);
    assert_eq!(diff.added, 2);
    assert_eq!(diff.removed, 1);
    assert_eq!(diff.modified, 0);
    assert_eq!(diff.to_string(), "2 added, 1 removed");
  }

  #[test]
  fn test_identical_layouts_in_any_order() {
    let a = vec![building(1, 0.0, 0.0, true), building(2, 5.0, 5.0, false)];
    let b = vec![a[1].clone(), a[0].clone()];

    assert!(diff_layouts(&a, &b, MissingFieldPolicy::Changed).is_empty());
    assert_eq!(layout_fingerprint(&a), layout_fingerprint(&b));
  }

  #[test]
  fn test_non_layout_fields_are_not_compared() {
    let cached = vec![building(1, 0.0, 0.0, true)];
    let mut fresh = cached.clone();
    fresh[0].workers = Some(12);
    fresh[0].health = Some(80.0);

    assert!(diff_layouts(&cached, &fresh, MissingFieldPolicy::Changed).is_empty());
  }

  #[test]
  fn test_missing_coordinate_policy() {
    let cached = vec![building(1, 3.0, 4.0, true)];
    let mut fresh = cached.clone();
    fresh[0].y = None;

    assert!(diff_layouts(&cached, &fresh, MissingFieldPolicy::Ignore).is_empty());
    assert_eq!(
      diff_layouts(&cached, &fresh, MissingFieldPolicy::Changed).modified,
      1
    );

    fill_missing(&cached, &mut fresh);
    assert_eq!(fresh[0].y, Some(4.0));
  }

  #[test]
  fn test_gaining_a_coordinate_is_a_change() {
    let mut cached = vec![building(1, 3.0, 4.0, true)];
    cached[0].z = None;
    let fresh = vec![building(1, 3.0, 4.0, true)];

    assert_eq!(
      diff_layouts(&cached, &fresh, MissingFieldPolicy::Ignore).modified,
      1
    );
  }

  #[test]
  fn test_dedupe_keeps_last_copy_in_first_position() {
    let fresh = vec![
      building(5, 1.0, 1.0, true),
      building(6, 0.0, 0.0, true),
      building(5, 2.0, 2.0, true),
    ];

    assert_eq!(
      dedupe_by_id(fresh),
      vec![building(5, 2.0, 2.0, true), building(6, 0.0, 0.0, true)]
    );
  }

  #[test]
  fn test_fingerprint_tracks_key_fields() {
    let a = vec![building(1, 0.0, 0.0, true)];
    let b = vec![building(1, 0.0, 0.0, false)];
    assert_ne!(layout_fingerprint(&a), layout_fingerprint(&b));
    assert_eq!(layout_fingerprint(&a).len(), 64);
  }
}
