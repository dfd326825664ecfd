//! Building layout cache with change detection.

use std::future::Future;
use std::sync::Arc;

use color_eyre::Result;
use tracing::{debug, info};

use crate::cache::{building_slot, CacheStorage, CachedRecord, Clock, MapMetadata};

use super::diff::{
  dedupe_by_id, diff_layouts, fill_missing, layout_fingerprint, LayoutDiff, MissingFieldPolicy,
};
use super::types::{CachedSettlementBuilding, SettlementBuilding};

/// Outcome of comparing a fresh layout against the cached one.
#[derive(Debug, Clone)]
pub struct ComparisonResult {
  pub has_changed: bool,
  pub diff: LayoutDiff,
  /// The layout now held in the cache
  pub buildings: Vec<SettlementBuilding>,
}

impl ComparisonResult {
  /// Human-readable summary, only when something changed.
  pub fn changes_summary(&self) -> Option<String> {
    self.has_changed.then(|| self.diff.to_string())
  }
}

/// Settlement building cache.
///
/// Layouts are not trusted on a TTL; every refresh is compared against the
/// cached copy and only a real difference is written back.
pub struct SettlementCacheService<S: CacheStorage> {
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
  policy: MissingFieldPolicy,
}

impl<S: CacheStorage> SettlementCacheService<S> {
  pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, policy: MissingFieldPolicy) -> Self {
    Self {
      storage,
      clock,
      policy,
    }
  }

  /// Compare `fresh` with the cached layout and persist it if it differs.
  ///
  /// A settlement without a cached layout always reports a change. Repeated
  /// building ids in `fresh` collapse to their last occurrence.
  pub fn compare_and_update(
    &self,
    settlement_id: i64,
    fresh: Vec<SettlementBuilding>,
  ) -> Result<ComparisonResult> {
    let mut fresh = dedupe_by_id(fresh);
    let cached = self.cached_buildings(settlement_id)?;
    let known = self.storage.get_map_metadata(settlement_id)?.is_some();
    let diff = diff_layouts(&cached, &fresh, self.policy);

    if known && diff.is_empty() {
      debug!(settlement_id, "No building changes");
      return Ok(ComparisonResult {
        has_changed: false,
        diff,
        buildings: cached,
      });
    }

    if self.policy == MissingFieldPolicy::Ignore {
      fill_missing(&cached, &mut fresh);
    }

    let now = self.clock.now();
    let metadata = MapMetadata {
      settlement_id,
      building_hash: layout_fingerprint(&fresh),
      building_count: fresh.len(),
      last_updated: now,
    };
    let records: Vec<CachedSettlementBuilding> = fresh
      .iter()
      .cloned()
      .map(|b| CachedSettlementBuilding::new(b, now))
      .collect();

    self
      .storage
      .replace_buildings(settlement_id, &records, &metadata)?;

    info!(
      settlement_id,
      added = diff.added,
      removed = diff.removed,
      modified = diff.modified,
      hash = %metadata.building_hash,
      "Building layout changed"
    );

    Ok(ComparisonResult {
      has_changed: true,
      diff,
      buildings: fresh,
    })
  }

  /// Fetch the layout and compare it. A failed fetch is returned as an
  /// error and leaves the cache as it was.
  pub async fn refresh_layout<F, Fut>(
    &self,
    settlement_id: i64,
    fetcher: F,
  ) -> Result<ComparisonResult>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<SettlementBuilding>>>,
  {
    let fresh = fetcher().await?;
    self.compare_and_update(settlement_id, fresh)
  }

  pub fn cached_buildings(&self, settlement_id: i64) -> Result<Vec<SettlementBuilding>> {
    self
      .storage
      .load_slot::<CachedSettlementBuilding>(&building_slot(settlement_id))?
      .records
      .into_iter()
      .map(CachedRecord::restore)
      .collect()
  }

  pub fn has_cached_buildings(&self, settlement_id: i64) -> Result<bool> {
    Ok(!self.cached_buildings(settlement_id)?.is_empty())
  }

  pub fn clear_settlement(&self, settlement_id: i64) -> Result<()> {
    self.storage.clear_settlement(settlement_id)?;
    info!(settlement_id, "Cleared settlement building cache");
    Ok(())
  }

  /// Milliseconds since the layout was last written, if it ever was.
  pub fn cache_age(&self, settlement_id: i64) -> Result<Option<i64>> {
    let now = self.clock.now();
    Ok(
      self
        .storage
        .get_map_metadata(settlement_id)?
        .map(|m| now - m.last_updated),
    )
  }

  pub fn map_metadata(&self, settlement_id: i64) -> Result<Option<MapMetadata>> {
    self.storage.get_map_metadata(settlement_id)
  }
}
