//! Per-key freshness tracking on top of the metadata table.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tracing::debug;

use super::category::Category;
use super::clock::{Clock, Timestamp};
use super::storage::{CacheMetadata, CacheStorage};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Coarse volatility label for a cache key, shown on status screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityClass {
  Static,
  SemiStatic,
  Dynamic,
  RealTime,
}

impl VolatilityClass {
  /// Classify a key by the data it names.
  pub fn for_key(key: &str) -> Self {
    if key.contains("statistics") || key.contains("population") {
      Self::Dynamic
    } else if key.contains("locations") || key.contains("online") {
      Self::RealTime
    } else if key.contains("settlement") || key.contains("faction") || key.contains("guild") {
      Self::SemiStatic
    } else {
      Self::Static
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Static => "Static",
      Self::SemiStatic => "Semi-static",
      Self::Dynamic => "Dynamic",
      Self::RealTime => "Real-time",
    }
  }
}

/// One row of the cache status listing.
#[derive(Debug, Clone)]
pub struct CacheStatusEntry {
  pub metadata: CacheMetadata,
  pub age_ms: i64,
  /// Time left before expiry; negative once expired
  pub remaining_ms: i64,
  pub fresh: bool,
  pub class: VolatilityClass,
}

impl CacheStatusEntry {
  pub fn age_display(&self) -> String {
    age_display(self.age_ms)
  }
}

/// Render an age in milliseconds the way status screens show it.
pub fn age_display(age_ms: i64) -> String {
  if age_ms < MINUTE_MS {
    // Also covers clock skew
    "just now".to_string()
  } else if age_ms < HOUR_MS {
    format!("{}m ago", age_ms / MINUTE_MS)
  } else if age_ms < DAY_MS {
    let hours = age_ms / HOUR_MS;
    if age_ms % HOUR_MS >= 30 * MINUTE_MS {
      format!("{}h ago", hours + 1)
    } else {
      format!("{}h ago", hours)
    }
  } else {
    let days = age_ms / DAY_MS;
    if age_ms % DAY_MS >= 12 * HOUR_MS {
      format!("{}d ago", days + 1)
    } else {
      format!("{}d ago", days)
    }
  }
}

fn duration_ms(ttl: Duration) -> i64 {
  i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Tracks when each cache key was last fetched and how long it stays fresh.
///
/// Only ever touches the metadata table.
pub struct MetadataTracker<S: CacheStorage> {
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<S: CacheStorage> MetadataTracker<S> {
  pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self { storage, clock }
  }

  pub fn now(&self) -> Timestamp {
    self.clock.now()
  }

  /// True iff an entry exists for `key` and it was fetched less than `ttl` ago.
  ///
  /// The stored TTL is ignored; the caller's TTL decides.
  pub fn is_fresh(&self, key: &str, ttl: Duration) -> Result<bool> {
    let fresh = match self.storage.get_metadata(key)? {
      Some(entry) => self.now() - entry.fetched_at < duration_ms(ttl),
      None => false,
    };
    Ok(fresh)
  }

  /// Metadata entry for a fetch completing now.
  pub fn entry(&self, key: &str, category: Category, ttl: Duration) -> CacheMetadata {
    CacheMetadata {
      key: key.to_string(),
      category: category.as_str().to_string(),
      fetched_at: self.now(),
      ttl_ms: duration_ms(ttl),
    }
  }

  /// Upsert the entry for `key` with `fetched_at = now`.
  pub fn record_fetch(&self, key: &str, category: Category, ttl: Duration) -> Result<()> {
    self.storage.put_metadata(&self.entry(key, category, ttl))
  }

  /// Forget when `key` was fetched so the next freshness check fails.
  pub fn invalidate(&self, key: &str) -> Result<bool> {
    let existed = self.storage.delete_metadata(key)?;
    debug!(key, existed, "Invalidated cache key");
    Ok(existed)
  }

  /// Delete every entry whose TTL has run out. Table rows stay as fallbacks.
  pub fn clear_expired(&self) -> Result<usize> {
    self.storage.delete_expired_metadata(self.now())
  }

  /// Every tracked key with its age and freshness.
  pub fn status(&self) -> Result<Vec<CacheStatusEntry>> {
    let now = self.now();
    let entries = self
      .storage
      .list_metadata()?
      .into_iter()
      .map(|metadata| CacheStatusEntry {
        age_ms: now - metadata.fetched_at,
        remaining_ms: metadata.expires_at().saturating_sub(now),
        fresh: metadata.is_fresh_at(now),
        class: VolatilityClass::for_key(&metadata.key),
        metadata,
      })
      .collect();
    Ok(entries)
  }
}

impl<S: CacheStorage> Clone for MetadataTracker<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      clock: Arc::clone(&self.clock),
    }
  }
}
