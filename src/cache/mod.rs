//! Generic caching layer for data persistence and offline support.
//!
//! This module provides a game-agnostic caching mechanism that:
//! - Keeps one table per data category plus a metadata table in SQLite
//! - Decides freshness per cache key from `fetched_at` and a caller TTL
//! - Replaces a key's rows and metadata in a single write
//! - Serves stale rows when the remote fetch fails (offline mode)

mod category;
mod clock;
mod layer;
mod metadata;
mod storage;
mod traits;
mod ttl;

pub use category::{Category, Table};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use layer::CacheLayer;
pub use metadata::{age_display, CacheStatusEntry, MetadataTracker, VolatilityClass};
pub use storage::{
  building_slot, CacheMetadata, CacheStorage, CachedSlot, MapMetadata, SqliteStorage, StoreStats,
};
pub use traits::{CacheKey, CacheResult, CacheSource, Cacheable, CachedRecord};
pub use ttl::{FreshnessClass, TtlPolicy};
