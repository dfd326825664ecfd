//! Cached access to codex data with transparent offline fallback.

use std::future::Future;
use std::sync::Arc;

use color_eyre::Result;
use tracing::info;

use crate::cache::{
  CacheKey, CacheLayer, CacheResult, CacheStatusEntry, CacheStorage, CachedRecord, Category,
  Clock, FreshnessClass, StoreStats, Timestamp, TtlPolicy,
};

use super::cache::{
  map_character_class, map_continent, map_faction, map_profession, map_region, map_resource,
  map_settlement, map_skill, map_spell, map_technology, map_world_statistics,
  CachedCharacterClass, CachedContinent, CachedFaction, CachedLoreEntry, CachedProfession,
  CachedRegion, CachedResource, CachedSettlement, CachedSkill, CachedSpell, CachedTechnology,
  CachedWorldStatistics, CodexKey, LORE_SLOT,
};
use super::types::{
  CharacterClass, Continent, Faction, LoreEntry, Profession, Region, Resource, Settlement, Skill,
  Spell, Technology, WorldStatistics,
};

/// Codex cache service.
///
/// Every getter takes the remote fetch as an opaque closure and answers from
/// the local store while the key is fresh. Construct one per process and hand
/// it to whatever needs codex data.
pub struct CodexCacheService<S: CacheStorage> {
  cache: CacheLayer<S>,
  ttl: TtlPolicy,
}

impl<S: CacheStorage> CodexCacheService<S> {
  pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, ttl: TtlPolicy) -> Self {
    Self {
      cache: CacheLayer::new(storage, clock),
      ttl,
    }
  }

  pub fn layer(&self) -> &CacheLayer<S> {
    &self.cache
  }

  async fn list<C, F, Fut>(
    &self,
    key: CodexKey,
    fetcher: F,
    mapper: fn(&C::Remote, Timestamp) -> Result<C>,
  ) -> Result<CacheResult<Vec<C::Remote>>>
  where
    C: CachedRecord,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<C::Remote>>>,
  {
    let ttl = self.ttl.ttl(key.freshness());
    self.cache.get_or_fetch(&key, fetcher, ttl, mapper).await
  }

  // --------------------------------------------------------------------------
  // Game mechanics
  // --------------------------------------------------------------------------

  pub async fn character_classes<F, Fut>(
    &self,
    fetcher: F,
  ) -> Result<CacheResult<Vec<CharacterClass>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<CharacterClass>>>,
  {
    self
      .list::<CachedCharacterClass, _, _>(CodexKey::CharacterClasses, fetcher, map_character_class)
      .await
  }

  pub async fn skills<F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<Skill>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Skill>>>,
  {
    self
      .list::<CachedSkill, _, _>(CodexKey::Skills, fetcher, map_skill)
      .await
  }

  pub async fn spells<F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<Spell>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Spell>>>,
  {
    self
      .list::<CachedSpell, _, _>(CodexKey::Spells, fetcher, map_spell)
      .await
  }

  pub async fn professions<F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<Profession>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Profession>>>,
  {
    self
      .list::<CachedProfession, _, _>(CodexKey::Professions, fetcher, map_profession)
      .await
  }

  pub async fn technologies<F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<Technology>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Technology>>>,
  {
    self
      .list::<CachedTechnology, _, _>(CodexKey::Technologies, fetcher, map_technology)
      .await
  }

  // --------------------------------------------------------------------------
  // Geography
  // --------------------------------------------------------------------------

  pub async fn continents<F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<Continent>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Continent>>>,
  {
    self
      .list::<CachedContinent, _, _>(CodexKey::Continents, fetcher, map_continent)
      .await
  }

  pub async fn regions<F, Fut>(
    &self,
    continent_id: Option<i64>,
    fetcher: F,
  ) -> Result<CacheResult<Vec<Region>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Region>>>,
  {
    self
      .list::<CachedRegion, _, _>(CodexKey::Regions { continent_id }, fetcher, map_region)
      .await
  }

  pub async fn settlements<F, Fut>(
    &self,
    region_id: Option<i64>,
    faction_id: Option<&str>,
    fetcher: F,
  ) -> Result<CacheResult<Vec<Settlement>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Settlement>>>,
  {
    let key = CodexKey::Settlements {
      region_id,
      faction_id: faction_id.map(String::from),
    };
    self
      .list::<CachedSettlement, _, _>(key, fetcher, map_settlement)
      .await
  }

  /// One settlement's detail record, cached under its own key.
  pub async fn settlement<F, Fut>(&self, id: &str, fetcher: F) -> Result<CacheResult<Settlement>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Settlement>>,
  {
    let key = CodexKey::Settlement { id: id.to_string() };
    let ttl = self.ttl.ttl(key.freshness());
    self
      .cache
      .get_or_fetch_one::<CachedSettlement, _, _, _, _>(&key, fetcher, ttl, map_settlement)
      .await
  }

  /// Whatever is cached for a settlement, fresh or not. Only for painting
  /// before the refresh completes.
  pub fn peek_settlement(&self, id: &str) -> Result<Option<CacheResult<Settlement>>> {
    let key = CodexKey::Settlement { id: id.to_string() };
    let peeked = self.cache.peek::<CachedSettlement>(&key.cache_key())?;

    Ok(peeked.and_then(|result| {
      let CacheResult {
        data,
        source,
        cached_at,
      } = result;
      data.into_iter().next().map(|data| CacheResult {
        data,
        source,
        cached_at,
      })
    }))
  }

  // --------------------------------------------------------------------------
  // World data
  // --------------------------------------------------------------------------

  pub async fn factions<F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<Faction>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Faction>>>,
  {
    self
      .list::<CachedFaction, _, _>(CodexKey::Factions, fetcher, map_faction)
      .await
  }

  pub async fn resources<F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<Resource>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Resource>>>,
  {
    self
      .list::<CachedResource, _, _>(CodexKey::Resources, fetcher, map_resource)
      .await
  }

  pub async fn world_statistics<F, Fut>(
    &self,
    fetcher: F,
  ) -> Result<CacheResult<WorldStatistics>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<WorldStatistics>>,
  {
    let key = CodexKey::WorldStatistics;
    let ttl = self.ttl.ttl(key.freshness());
    self
      .cache
      .get_or_fetch_one::<CachedWorldStatistics, _, _, _, _>(
        &key,
        fetcher,
        ttl,
        map_world_statistics,
      )
      .await
  }

  // --------------------------------------------------------------------------
  // Lore (manual entry, never fetched)
  // --------------------------------------------------------------------------

  fn lore_record(&self, entry: LoreEntry) -> CachedLoreEntry {
    CachedLoreEntry {
      entry,
      last_updated: self.cache.metadata().now(),
    }
  }

  /// Insert or overwrite one lore entry.
  pub fn store_lore_entry(&self, entry: LoreEntry) -> Result<()> {
    let key = CodexKey::Lore {
      id: entry.id.clone(),
    };
    let record = self.lore_record(entry);
    let metadata = self.cache.metadata().entry(
      &key.cache_key(),
      key.category(),
      self.ttl.ttl(key.freshness()),
    );

    self
      .cache
      .storage()
      .upsert_records(LORE_SLOT, &[record], metadata.fetched_at, Some(&metadata))
  }

  /// Insert or overwrite many lore entries in one write.
  pub fn bulk_import_lore(&self, entries: Vec<LoreEntry>) -> Result<usize> {
    let key = CodexKey::LoreBulkImport;
    let records: Vec<CachedLoreEntry> = entries
      .into_iter()
      .map(|entry| self.lore_record(entry))
      .collect();
    let metadata = self.cache.metadata().entry(
      &key.cache_key(),
      key.category(),
      self.ttl.ttl(key.freshness()),
    );

    self
      .cache
      .storage()
      .upsert_records(LORE_SLOT, &records, metadata.fetched_at, Some(&metadata))?;

    info!(count = records.len(), "Imported lore entries");
    Ok(records.len())
  }

  fn lore_entries(&self) -> Result<Vec<LoreEntry>> {
    let slot = self.cache.storage().load_slot::<CachedLoreEntry>(LORE_SLOT)?;
    Ok(slot.records.into_iter().map(|r| r.entry).collect())
  }

  /// Case-insensitive search over title, content, summary and tags,
  /// optionally restricted to one lore category.
  pub fn search_lore(&self, query: &str, category: Option<&str>) -> Result<Vec<LoreEntry>> {
    let entries = self
      .lore_entries()?
      .into_iter()
      .filter(|e| category.map_or(true, |c| e.category == c))
      .filter(|e| e.matches(query))
      .collect();
    Ok(entries)
  }

  pub fn lore_by_category(&self, category: &str) -> Result<Vec<LoreEntry>> {
    let mut entries: Vec<LoreEntry> = self
      .lore_entries()?
      .into_iter()
      .filter(|e| e.category == category)
      .collect();
    entries.sort_by(|a, b| a.title.cmp(&b.title));
    Ok(entries)
  }

  // --------------------------------------------------------------------------
  // Maintenance
  // --------------------------------------------------------------------------

  /// Drop the metadata of `key` so its next read refetches. Rows stay.
  pub fn force_refresh(&self, key: &str) -> Result<bool> {
    self.cache.metadata().invalidate(key)
  }

  pub fn clear_all_cache(&self) -> Result<()> {
    self.cache.storage().clear_all()?;
    info!("Cleared all cached data");
    Ok(())
  }

  pub fn clear_expired_cache(&self) -> Result<usize> {
    let removed = self.cache.metadata().clear_expired()?;
    info!(removed, "Cleared expired cache metadata");
    Ok(removed)
  }

  pub fn clear_category(&self, category: Category) -> Result<()> {
    self.cache.storage().clear_category(category)?;
    info!(%category, "Cleared cache category");
    Ok(())
  }

  pub fn cache_stats(&self) -> Result<StoreStats> {
    self.cache.storage().stats()
  }

  pub fn cache_status(&self) -> Result<Vec<CacheStatusEntry>> {
    self.cache.metadata().status()
  }

  /// TTL the service applies to a freshness class.
  pub fn ttl_for(&self, class: FreshnessClass) -> std::time::Duration {
    self.ttl.ttl(class)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use color_eyre::eyre::eyre;

  use super::*;
  use crate::cache::{CacheSource, ManualClock, SqliteStorage};

  const HOUR_MS: i64 = 3_600_000;

  fn service(clock: Arc<ManualClock>) -> CodexCacheService<SqliteStorage> {
    CodexCacheService::new(
      Arc::new(SqliteStorage::in_memory().unwrap()),
      clock,
      TtlPolicy::default(),
    )
  }

  fn skill(id: i64, name: &str) -> Skill {
    Skill {
      id,
      name: name.to_string(),
      description: String::new(),
      category: "combat".to_string(),
      max_level: Some(10),
      prerequisites: None,
    }
  }

  fn settlement(id: &str, region_id: i64) -> Settlement {
    Settlement {
      id: id.to_string(),
      name: format!("Settlement {}", id),
      kind: "town".to_string(),
      population: 250,
      faction_id: None,
      faction_name: None,
      region_id: Some(region_id),
      region_name: None,
      description: None,
      founded: None,
      is_capital: Some(false),
    }
  }

  fn lore(id: &str, title: &str, category: &str, tags: Option<&str>) -> LoreEntry {
    LoreEntry {
      id: id.to_string(),
      title: title.to_string(),
      category: category.to_string(),
      subcategory: None,
      content: "Long ago".to_string(),
      summary: "A tale".to_string(),
      tags: tags.map(String::from),
    }
  }

  #[tokio::test]
  async fn test_skills_hit_within_a_day_and_miss_after() {
    let clock = Arc::new(ManualClock::new(0));
    let service = service(clock.clone());
    let calls = AtomicUsize::new(0);

    let fetch = || {
      let counter = &calls;
      move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, color_eyre::Report>(vec![skill(1, "Archery")])
      }
    };

    let first = service.skills(fetch()).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);

    clock.advance_millis(HOUR_MS);
    let second = service.skills(fetch()).await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, vec![skill(1, "Archery")]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance_millis(24 * HOUR_MS);
    service.skills(fetch()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_settlement_filters_use_separate_slots() {
    let service = service(Arc::new(ManualClock::new(0)));

    service
      .settlements(Some(7), None, || async {
        Ok(vec![settlement("a", 7), settlement("b", 7)])
      })
      .await
      .unwrap();
    service
      .settlements(Some(8), None, || async { Ok(vec![settlement("c", 8)]) })
      .await
      .unwrap();

    let region_seven = service
      .settlements(Some(7), None, || async { Err(eyre!("should not be called")) })
      .await
      .unwrap();
    assert_eq!(region_seven.source, CacheSource::CacheFresh);
    assert_eq!(region_seven.data.len(), 2);
  }

  #[tokio::test]
  async fn test_force_refresh_keeps_rows_for_fallback() {
    let service = service(Arc::new(ManualClock::new(0)));
    service
      .skills(|| async { Ok(vec![skill(1, "Archery")]) })
      .await
      .unwrap();

    assert!(service.force_refresh("skills").unwrap());

    let result = service
      .skills(|| async { Err(eyre!("offline")) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, vec![skill(1, "Archery")]);
  }

  #[tokio::test]
  async fn test_world_statistics_expire_after_five_minutes() {
    use crate::codex::types::WorldTime;
    use chrono::{TimeZone, Utc};

    let clock = Arc::new(ManualClock::new(0));
    let service = service(clock.clone());
    let stats = WorldStatistics {
      total_characters: 10,
      total_classes: 4,
      online_players: 3,
      total_settlements: 2,
      active_battles: 0,
      total_factions: 2,
      total_guilds: 1,
      world_time: WorldTime {
        current_day: 1,
        time_of_day: 0.25,
        season: "Spring".to_string(),
        year: 1,
        server_time: Utc.timestamp_millis_opt(0).unwrap(),
      },
      server_uptime: "1h".to_string(),
    };

    let fetched = stats.clone();
    service
      .world_statistics(move || async move { Ok(fetched) })
      .await
      .unwrap();

    clock.advance_millis(4 * 60_000);
    let cached = service
      .world_statistics(|| async { Err(eyre!("should not be called")) })
      .await
      .unwrap();
    assert_eq!(cached.data, stats);

    clock.advance_millis(60_000);
    let stale = service
      .world_statistics(|| async { Err(eyre!("offline")) })
      .await
      .unwrap();
    assert_eq!(stale.source, CacheSource::Offline);
  }

  #[test]
  fn test_lore_search_and_category_listing() {
    let service = service(Arc::new(ManualClock::new(0)));
    service
      .bulk_import_lore(vec![
        lore("1", "The Sundering", "history", Some("war,ancient")),
        lore("2", "Ashen Vale", "places", None),
      ])
      .unwrap();
    service
      .store_lore_entry(lore("3", "Age of Embers", "history", None))
      .unwrap();

    assert_eq!(service.search_lore("ANCIENT", None).unwrap().len(), 1);
    assert_eq!(service.search_lore("tale", Some("places")).unwrap().len(), 1);
    assert_eq!(service.search_lore("vale", Some("history")).unwrap().len(), 0);

    let history: Vec<String> = service
      .lore_by_category("history")
      .unwrap()
      .into_iter()
      .map(|e| e.title)
      .collect();
    assert_eq!(history, vec!["Age of Embers", "The Sundering"]);

    let keys: Vec<String> = service
      .cache_status()
      .unwrap()
      .into_iter()
      .map(|e| e.metadata.key)
      .collect();
    assert!(keys.contains(&"lore-3".to_string()));
    assert!(keys.contains(&"lore-bulk-import".to_string()));
  }

  #[tokio::test]
  async fn test_clear_category_leaves_other_categories() {
    let service = service(Arc::new(ManualClock::new(0)));
    service
      .skills(|| async { Ok(vec![skill(1, "Archery")]) })
      .await
      .unwrap();
    service
      .settlements(None, None, || async { Ok(vec![settlement("a", 1)]) })
      .await
      .unwrap();

    service.clear_category(Category::Geography).unwrap();

    let remaining: Vec<String> = service
      .cache_status()
      .unwrap()
      .into_iter()
      .map(|e| e.metadata.key)
      .collect();
    assert_eq!(remaining, vec!["skills".to_string()]);
    assert_eq!(service.cache_stats().unwrap().total_rows, 1);
  }
}
