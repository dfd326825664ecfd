//! Core traits and types for the caching system.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};

use super::category::{Category, Table};
use super::clock::Timestamp;

/// A record that can be persisted in one of the category tables.
///
/// Implementors provide their natural key and the table they live in.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Natural key of the record inside its table (e.g., skill id, settlement id)
  fn record_id(&self) -> String;

  /// Table this record type is stored in
  fn table() -> Table;
}

/// A cached record that can be turned back into the shape the remote API returns.
///
/// The forward direction is the per-category mapper passed to the cache layer;
/// this is the inverse, so cache hits and misses hand callers the same type.
pub trait CachedRecord: Cacheable {
  type Remote;

  /// Rebuild the remote shape, decoding any nested fields stored as JSON strings.
  fn restore(self) -> Result<Self::Remote>;
}

/// Logical cache slot identifier.
///
/// Identical logical queries must produce identical keys so they hit the same slot.
pub trait CacheKey {
  /// Stable string key (e.g., "skills", "settlements-7-all")
  fn cache_key(&self) -> String;

  /// Category recorded in the metadata entry
  fn category(&self) -> Category;

  /// Human-readable description for logs
  fn description(&self) -> String;
}

impl CacheKey for (String, Category) {
  fn cache_key(&self) -> String {
    self.0.clone()
  }

  fn category(&self) -> Category {
    self.1
  }

  fn description(&self) -> String {
    self.0.clone()
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the served copy was written to the store (if from cache)
  pub cached_at: Option<Timestamp>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: Option<Timestamp>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at,
    }
  }

  /// Create a new cache result served because the remote fetch failed.
  pub fn offline(data: T, cached_at: Option<Timestamp>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }

  /// Whether the data may be older than its TTL.
  pub fn is_stale(&self) -> bool {
    matches!(self.source, CacheSource::CacheStale | CacheSource::Offline)
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache read without a freshness check (stale-first paint)
  CacheStale,
  /// Network failed, serving whatever the cache had
  Offline,
}
