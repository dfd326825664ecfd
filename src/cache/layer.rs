//! Cache layer that orchestrates caching logic with network fetching.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};

use super::clock::{Clock, Timestamp};
use super::metadata::MetadataTracker;
use super::storage::CacheStorage;
use super::traits::{CacheKey, CacheResult, CachedRecord};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the remote API client,
/// providing transparent caching with offline support. It does not
/// deduplicate concurrent calls for the same key; screens guard against
/// duplicate loads themselves.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  metadata: MetadataTracker<S>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer over a shared storage backend.
  pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self {
      metadata: MetadataTracker::new(Arc::clone(&storage), clock),
      storage,
    }
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  pub fn metadata(&self) -> &MetadataTracker<S> {
    &self.metadata
  }

  /// Fetch a list with cache-first strategy.
  ///
  /// 1. If the key is fresh and its slot is non-empty, return the slot
  /// 2. Otherwise fetch, map every record, replace the slot and its metadata
  ///    in one write, and return the fetched records
  /// 3. On fetch failure, return whatever the slot holds (offline mode), or
  ///    the fetch error when it holds nothing
  ///
  /// Storage and mapping errors are returned as-is.
  pub async fn get_or_fetch<C, K, F, Fut, M>(
    &self,
    key: &K,
    fetcher: F,
    ttl: Duration,
    mapper: M,
  ) -> Result<CacheResult<Vec<C::Remote>>>
  where
    C: CachedRecord,
    K: CacheKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<C::Remote>>>,
    M: Fn(&C::Remote, Timestamp) -> Result<C>,
  {
    let slot_key = key.cache_key();

    if self.metadata.is_fresh(&slot_key, ttl)? {
      let cached = self.storage.load_slot::<C>(&slot_key)?;
      if !cached.is_empty() {
        debug!(key = %slot_key, rows = cached.records.len(), "Cache hit");
        return Ok(CacheResult::from_cache(
          restore_all(cached.records)?,
          cached.written_at,
          false,
        ));
      }
    }

    debug!(key = %slot_key, what = %key.description(), "Cache miss, fetching");

    match fetcher().await {
      Ok(data) => {
        let entry = self.metadata.entry(&slot_key, key.category(), ttl);
        let mapped = data
          .iter()
          .map(|record| mapper(record, entry.fetched_at))
          .collect::<Result<Vec<C>>>()?;

        self.storage.replace_slot(&slot_key, &mapped, &entry)?;
        Ok(CacheResult::from_network(data))
      }
      Err(err) => {
        let stale = self.storage.load_slot::<C>(&slot_key)?;
        if stale.is_empty() {
          warn!(key = %slot_key, error = %err, "Fetch failed with nothing cached");
          return Err(err);
        }

        warn!(
          key = %slot_key,
          error = %err,
          rows = stale.records.len(),
          "Fetch failed, serving stale cache"
        );
        Ok(CacheResult::offline(
          restore_all(stale.records)?,
          stale.written_at,
        ))
      }
    }
  }

  /// Fetch a singleton record (fixed identity) with the same rules as
  /// [`CacheLayer::get_or_fetch`].
  pub async fn get_or_fetch_one<C, K, F, Fut, M>(
    &self,
    key: &K,
    fetcher: F,
    ttl: Duration,
    mapper: M,
  ) -> Result<CacheResult<C::Remote>>
  where
    C: CachedRecord,
    K: CacheKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<C::Remote>>,
    M: Fn(&C::Remote, Timestamp) -> Result<C>,
  {
    let result = self
      .get_or_fetch::<C, _, _, _, _>(
        key,
        || async move { fetcher().await.map(|record| vec![record]) },
        ttl,
        mapper,
      )
      .await?;

    let CacheResult {
      data,
      source,
      cached_at,
    } = result;
    let record = data
      .into_iter()
      .next()
      .ok_or_else(|| eyre!("Cache slot {} is empty", key.cache_key()))?;

    Ok(CacheResult {
      data: record,
      source,
      cached_at,
    })
  }

  /// Read a slot without consulting freshness, for stale-first paint.
  ///
  /// Returns `None` when the slot is empty.
  pub fn peek<C: CachedRecord>(&self, key: &str) -> Result<Option<CacheResult<Vec<C::Remote>>>> {
    let cached = self.storage.load_slot::<C>(key)?;
    if cached.is_empty() {
      return Ok(None);
    }
    Ok(Some(CacheResult::from_cache(
      restore_all(cached.records)?,
      cached.written_at,
      true,
    )))
  }
}

fn restore_all<C: CachedRecord>(records: Vec<C>) -> Result<Vec<C::Remote>> {
  records.into_iter().map(CachedRecord::restore).collect()
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      metadata: self.metadata.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::category::{Category, Table};
  use crate::cache::clock::ManualClock;
  use crate::cache::storage::SqliteStorage;
  use crate::cache::traits::{CacheSource, Cacheable};
  use serde::{Deserialize, Serialize};
  use std::sync::atomic::{AtomicU32, Ordering};

  const DAY: Duration = Duration::from_secs(24 * 3600);
  const HOUR_MS: i64 = 3_600_000;

  #[derive(Debug, Clone, PartialEq)]
  struct Skill {
    id: u32,
    name: String,
    tags: Vec<String>,
  }

  #[derive(Debug, Clone, Serialize, Deserialize)]
  struct CachedSkill {
    id: u32,
    name: String,
    tags: String,
    last_updated: Timestamp,
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
        id: self.id,
        name: self.name,
        tags: serde_json::from_str(&self.tags)?,
      })
    }
  }

  fn map_skill(skill: &Skill, now: Timestamp) -> Result<CachedSkill> {
    if skill.name.is_empty() {
      return Err(eyre!("skill {} has no name", skill.id));
    }
    Ok(CachedSkill {
      id: skill.id,
      name: skill.name.clone(),
      tags: serde_json::to_string(&skill.tags)?,
      last_updated: now,
    })
  }

  fn skill(id: u32, name: &str) -> Skill {
    Skill {
      id,
      name: name.to_string(),
      tags: vec!["combat".to_string()],
    }
  }

  fn key() -> (String, Category) {
    ("skills".to_string(), Category::Mechanics)
  }

  fn layer(clock: Arc<ManualClock>) -> CacheLayer<SqliteStorage> {
    CacheLayer::new(Arc::new(SqliteStorage::in_memory().unwrap()), clock)
  }

  #[tokio::test]
  async fn test_hit_within_ttl_and_miss_after() {
    let clock = Arc::new(ManualClock::new(0));
    let layer = layer(clock.clone());
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let fetch = move || async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok::<_, color_eyre::Report>(vec![skill(1, "Archery")])
    };

    let first = layer.get_or_fetch(&key(), fetch, DAY, map_skill).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data, vec![skill(1, "Archery")]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance_millis(HOUR_MS);
    let second = layer.get_or_fetch(&key(), fetch, DAY, map_skill).await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, vec![skill(1, "Archery")]);
    assert_eq!(second.cached_at, Some(0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance_millis(24 * HOUR_MS);
    let third = layer.get_or_fetch(&key(), fetch, DAY, map_skill).await.unwrap();
    assert_eq!(third.source, CacheSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_refresh_replaces_previous_rows() {
    let clock = Arc::new(ManualClock::new(0));
    let layer = layer(clock.clone());

    layer
      .get_or_fetch(
        &key(),
        || async { Ok(vec![skill(1, "Archery"), skill(2, "Smithing")]) },
        Duration::ZERO,
        map_skill,
      )
      .await
      .unwrap();
    layer
      .get_or_fetch(
        &key(),
        || async { Ok(vec![skill(3, "Alchemy")]) },
        Duration::ZERO,
        map_skill,
      )
      .await
      .unwrap();

    let cached = layer.peek::<CachedSkill>("skills").unwrap().unwrap();
    assert_eq!(cached.data, vec![skill(3, "Alchemy")]);
    assert_eq!(cached.source, CacheSource::CacheStale);
  }

  #[tokio::test]
  async fn test_zero_ttl_always_fetches() {
    let layer = layer(Arc::new(ManualClock::new(0)));
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let fetch = move || async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok::<_, color_eyre::Report>(vec![skill(1, "Archery")])
    };

    for _ in 0..3 {
      layer
        .get_or_fetch(&key(), fetch, Duration::ZERO, map_skill)
        .await
        .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_failed_fetch_serves_stale_without_touching_metadata() {
    let clock = Arc::new(ManualClock::new(0));
    let layer = layer(clock.clone());

    layer
      .get_or_fetch(&key(), || async { Ok(vec![skill(1, "Archery")]) }, DAY, map_skill)
      .await
      .unwrap();
    let before = layer.storage().get_metadata("skills").unwrap();

    clock.advance_millis(25 * HOUR_MS);
    let result = layer
      .get_or_fetch::<CachedSkill, _, _, _, _>(
        &key(),
        || async { Err(eyre!("connection refused")) },
        DAY,
        map_skill,
      )
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, vec![skill(1, "Archery")]);
    assert_eq!(layer.storage().get_metadata("skills").unwrap(), before);
    // Stale data is not marked fresh
    assert!(!layer.metadata().is_fresh("skills", DAY).unwrap());
  }

  #[tokio::test]
  async fn test_failed_fetch_with_empty_cache_propagates() {
    let layer = layer(Arc::new(ManualClock::new(0)));

    let result = layer
      .get_or_fetch::<CachedSkill, _, _, _, _>(
        &key(),
        || async { Err(eyre!("connection refused")) },
        DAY,
        map_skill,
      )
      .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("connection refused"));
  }

  #[tokio::test]
  async fn test_failed_write_keeps_previous_snapshot() {
    let clock = Arc::new(ManualClock::new(0));
    let layer = layer(clock.clone());

    layer
      .get_or_fetch(&key(), || async { Ok(vec![skill(1, "Archery")]) }, DAY, map_skill)
      .await
      .unwrap();
    let before = layer.storage().get_metadata("skills").unwrap();

    clock.advance_millis(25 * HOUR_MS);
    // The unnamed skill fails to map
    let result = layer
      .get_or_fetch(
        &key(),
        || async { Ok(vec![skill(2, "Smithing"), skill(3, "")]) },
        DAY,
        map_skill,
      )
      .await;

    assert!(result.is_err());
    let cached = layer.peek::<CachedSkill>("skills").unwrap().unwrap();
    assert_eq!(cached.data, vec![skill(1, "Archery")]);
    assert_eq!(layer.storage().get_metadata("skills").unwrap(), before);
  }

  #[tokio::test]
  async fn test_fresh_metadata_with_empty_slot_refetches() {
    let layer = layer(Arc::new(ManualClock::new(0)));
    layer
      .metadata()
      .record_fetch("skills", Category::Mechanics, DAY)
      .unwrap();

    let result = layer
      .get_or_fetch(&key(), || async { Ok(vec![skill(1, "Archery")]) }, DAY, map_skill)
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test]
  async fn test_force_refresh_keeps_rows_for_fallback() {
    let layer = layer(Arc::new(ManualClock::new(0)));
    layer
      .get_or_fetch(&key(), || async { Ok(vec![skill(1, "Archery")]) }, DAY, map_skill)
      .await
      .unwrap();

    layer.metadata().invalidate("skills").unwrap();

    let result = layer
      .get_or_fetch::<CachedSkill, _, _, _, _>(
        &key(),
        || async { Err(eyre!("timeout")) },
        DAY,
        map_skill,
      )
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Offline);
  }

  #[tokio::test]
  async fn test_concurrent_calls_are_not_deduplicated() {
    let layer = layer(Arc::new(ManualClock::new(0)));
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let fetch = move || async move {
      counter.fetch_add(1, Ordering::SeqCst);
      tokio::task::yield_now().await;
      Ok::<_, color_eyre::Report>(vec![skill(1, "Archery")])
    };

    let (first_key, second_key) = (key(), key());
    let (a, b) = tokio::join!(
      layer.get_or_fetch(&first_key, fetch, DAY, map_skill),
      layer.get_or_fetch(&second_key, fetch, DAY, map_skill)
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_singleton_fetch() {
    let clock = Arc::new(ManualClock::new(0));
    let layer = layer(clock.clone());

    let first = layer
      .get_or_fetch_one(&key(), || async { Ok(skill(1, "Archery")) }, DAY, map_skill)
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = layer
      .get_or_fetch_one::<CachedSkill, _, _, _, _>(
        &key(),
        || async { Err(eyre!("should not be called")) },
        DAY,
        map_skill,
      )
      .await
      .unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, skill(1, "Archery"));
  }
}
