//! Cache storage trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::category::{Category, Table};
use super::clock::Timestamp;
use super::traits::Cacheable;

/// Freshness bookkeeping for one cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMetadata {
  pub key: String,
  pub category: String,
  pub fetched_at: Timestamp,
  pub ttl_ms: i64,
}

impl CacheMetadata {
  pub fn is_fresh_at(&self, now: Timestamp) -> bool {
    now - self.fetched_at < self.ttl_ms
  }

  pub fn expires_at(&self) -> Timestamp {
    self.fetched_at.saturating_add(self.ttl_ms)
  }
}

/// Bookkeeping for a settlement's cached building layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapMetadata {
  pub settlement_id: i64,
  /// Fingerprint of the key fields of the cached layout
  pub building_hash: String,
  pub building_count: usize,
  pub last_updated: Timestamp,
}

/// Contents of one cache slot.
#[derive(Debug, Clone)]
pub struct CachedSlot<T> {
  /// The cached records in fetch order
  pub records: Vec<T>,
  /// When the newest row of the slot was written
  pub written_at: Option<Timestamp>,
}

impl<T> CachedSlot<T> {
  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

/// Row counts and fetch range across the whole store.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
  pub rows_by_table: Vec<(Table, usize)>,
  pub total_rows: usize,
  pub oldest_fetch: Option<Timestamp>,
  pub newest_fetch: Option<Timestamp>,
}

/// Trait for cache storage backends.
///
/// Every write that touches both a data table and a metadata table must be
/// all-or-nothing.
pub trait CacheStorage: Send + Sync {
  /// Read the rows of one slot, in the order they were written.
  fn load_slot<T: Cacheable>(&self, slot: &str) -> Result<CachedSlot<T>>;

  /// Read every row of `T`'s table regardless of slot.
  fn load_table<T: Cacheable>(&self) -> Result<Vec<T>>;

  /// Replace the rows of a slot and upsert its metadata entry in one write.
  fn replace_slot<T: Cacheable>(
    &self,
    slot: &str,
    records: &[T],
    metadata: &CacheMetadata,
  ) -> Result<()>;

  /// Insert or overwrite individual rows of a slot, keeping the others.
  fn upsert_records<T: Cacheable>(
    &self,
    slot: &str,
    records: &[T],
    written_at: Timestamp,
    metadata: Option<&CacheMetadata>,
  ) -> Result<()>;

  fn get_metadata(&self, key: &str) -> Result<Option<CacheMetadata>>;

  fn put_metadata(&self, metadata: &CacheMetadata) -> Result<()>;

  /// Returns whether an entry existed.
  fn delete_metadata(&self, key: &str) -> Result<bool>;

  fn list_metadata(&self) -> Result<Vec<CacheMetadata>>;

  /// Delete metadata entries whose TTL ran out at `now`. Rows are kept.
  fn delete_expired_metadata(&self, now: Timestamp) -> Result<usize>;

  /// Replace the building rows of a settlement and its map metadata in one write.
  fn replace_buildings<T: Cacheable>(
    &self,
    settlement_id: i64,
    records: &[T],
    metadata: &MapMetadata,
  ) -> Result<()>;

  fn get_map_metadata(&self, settlement_id: i64) -> Result<Option<MapMetadata>>;

  /// Drop the building rows and map metadata of a settlement.
  fn clear_settlement(&self, settlement_id: i64) -> Result<()>;

  /// Delete the category's metadata entries and clear its tables.
  fn clear_category(&self, category: Category) -> Result<()>;

  fn clear_all(&self) -> Result<()>;

  fn stats(&self) -> Result<StoreStats>;
}

/// Slot under which a settlement's buildings are stored.
pub fn building_slot(settlement_id: i64) -> String {
  settlement_id.to_string()
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Create a new SQLite storage at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Create a new SQLite storage at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Create a storage that lives only as long as the process.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("meridian-cache").join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    for table in Table::ALL {
      conn
        .execute_batch(&table_schema(table))
        .map_err(|e| eyre!("Failed to create table {}: {}", table.name(), e))?;
    }

    Ok(())
  }
}

/// Schema for metadata tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_metadata (
    key TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    ttl_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_metadata_category ON cache_metadata(category);

CREATE TABLE IF NOT EXISTS settlement_map_metadata (
    settlement_id INTEGER PRIMARY KEY,
    building_hash TEXT NOT NULL,
    building_count INTEGER NOT NULL,
    last_updated INTEGER NOT NULL
);
"#;

/// Schema shared by every category table (stores serialized JSON per row).
fn table_schema(table: Table) -> String {
  format!(
    "CREATE TABLE IF NOT EXISTS {name} (
        slot TEXT NOT NULL,
        record_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        data BLOB NOT NULL,
        last_updated INTEGER NOT NULL,
        PRIMARY KEY (slot, record_id)
    );
    CREATE INDEX IF NOT EXISTS idx_{name}_slot ON {name}(slot, position);",
    name = table.name()
  )
}

/// Write rows into a slot starting at `first_position`.
///
/// Serialization happens row by row inside the transaction, so a failing
/// record aborts the whole write.
fn insert_rows<T: Cacheable>(
  tx: &Transaction<'_>,
  table: Table,
  slot: &str,
  records: &[T],
  first_position: i64,
  written_at: Timestamp,
) -> Result<()> {
  let sql = format!(
    "INSERT OR REPLACE INTO {} (slot, record_id, position, data, last_updated)
     VALUES (?, ?, ?, ?, ?)",
    table.name()
  );
  let mut stmt = tx
    .prepare(&sql)
    .map_err(|e| eyre!("Failed to prepare insert into {}: {}", table.name(), e))?;

  for (offset, record) in records.iter().enumerate() {
    let data =
      serde_json::to_vec(record).map_err(|e| eyre!("Failed to serialize record: {}", e))?;
    stmt
      .execute(params![
        slot,
        record.record_id(),
        first_position + offset as i64,
        data,
        written_at
      ])
      .map_err(|e| eyre!("Failed to store record in {}: {}", table.name(), e))?;
  }

  Ok(())
}

fn upsert_metadata(conn: &Connection, metadata: &CacheMetadata) -> Result<()> {
  conn
    .execute(
      "INSERT OR REPLACE INTO cache_metadata (key, category, fetched_at, ttl_ms)
       VALUES (?, ?, ?, ?)",
      params![
        metadata.key,
        metadata.category,
        metadata.fetched_at,
        metadata.ttl_ms
      ],
    )
    .map_err(|e| eyre!("Failed to update cache metadata: {}", e))?;
  Ok(())
}

fn metadata_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheMetadata> {
  Ok(CacheMetadata {
    key: row.get(0)?,
    category: row.get(1)?,
    fetched_at: row.get(2)?,
    ttl_ms: row.get(3)?,
  })
}

impl CacheStorage for SqliteStorage {
  fn load_slot<T: Cacheable>(&self, slot: &str) -> Result<CachedSlot<T>> {
    let conn = self.lock()?;
    let table = T::table();

    let sql = format!(
      "SELECT data, last_updated FROM {} WHERE slot = ? ORDER BY position",
      table.name()
    );
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(Vec<u8>, Timestamp)> = stmt
      .query_map(params![slot], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to query {}: {}", table.name(), e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read {}: {}", table.name(), e))?;

    let written_at = rows.iter().map(|(_, at)| *at).max();
    let records = rows
      .into_iter()
      .map(|(data, _)| {
        serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize {} record: {}", table.name(), e))
      })
      .collect::<Result<Vec<T>>>()?;

    Ok(CachedSlot {
      records,
      written_at,
    })
  }

  fn load_table<T: Cacheable>(&self) -> Result<Vec<T>> {
    let conn = self.lock()?;
    let table = T::table();

    let sql = format!("SELECT data FROM {} ORDER BY slot, position", table.name());
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query {}: {}", table.name(), e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read {}: {}", table.name(), e))?;

    rows
      .iter()
      .map(|data| {
        serde_json::from_slice(data)
          .map_err(|e| eyre!("Failed to deserialize {} record: {}", table.name(), e))
      })
      .collect()
  }

  fn replace_slot<T: Cacheable>(
    &self,
    slot: &str,
    records: &[T],
    metadata: &CacheMetadata,
  ) -> Result<()> {
    let mut conn = self.lock()?;
    let table = T::table();

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      &format!("DELETE FROM {} WHERE slot = ?", table.name()),
      params![slot],
    )
    .map_err(|e| eyre!("Failed to clear slot {} in {}: {}", slot, table.name(), e))?;

    insert_rows(&tx, table, slot, records, 0, metadata.fetched_at)?;

    // Rows land before metadata inside the same transaction
    upsert_metadata(&tx, metadata)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn upsert_records<T: Cacheable>(
    &self,
    slot: &str,
    records: &[T],
    written_at: Timestamp,
    metadata: Option<&CacheMetadata>,
  ) -> Result<()> {
    let mut conn = self.lock()?;
    let table = T::table();

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let next_position: i64 = tx
      .query_row(
        &format!(
          "SELECT COALESCE(MAX(position), -1) + 1 FROM {} WHERE slot = ?",
          table.name()
        ),
        params![slot],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to read slot positions: {}", e))?;

    insert_rows(&tx, table, slot, records, next_position, written_at)?;

    if let Some(metadata) = metadata {
      upsert_metadata(&tx, metadata)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get_metadata(&self, key: &str) -> Result<Option<CacheMetadata>> {
    let conn = self.lock()?;

    conn
      .query_row(
        "SELECT key, category, fetched_at, ttl_ms FROM cache_metadata WHERE key = ?",
        params![key],
        metadata_from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache metadata for {}: {}", key, e))
  }

  fn put_metadata(&self, metadata: &CacheMetadata) -> Result<()> {
    let conn = self.lock()?;
    upsert_metadata(&conn, metadata)
  }

  fn delete_metadata(&self, key: &str) -> Result<bool> {
    let conn = self.lock()?;

    let deleted = conn
      .execute("DELETE FROM cache_metadata WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete cache metadata for {}: {}", key, e))?;

    Ok(deleted > 0)
  }

  fn list_metadata(&self) -> Result<Vec<CacheMetadata>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT key, category, fetched_at, ttl_ms FROM cache_metadata ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let entries = stmt
      .query_map([], metadata_from_row)
      .map_err(|e| eyre!("Failed to query cache metadata: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache metadata: {}", e))?;

    Ok(entries)
  }

  fn delete_expired_metadata(&self, now: Timestamp) -> Result<usize> {
    let conn = self.lock()?;

    conn
      .execute(
        "DELETE FROM cache_metadata WHERE fetched_at + ttl_ms <= ?",
        params![now],
      )
      .map_err(|e| eyre!("Failed to delete expired cache metadata: {}", e))
  }

  fn replace_buildings<T: Cacheable>(
    &self,
    settlement_id: i64,
    records: &[T],
    metadata: &MapMetadata,
  ) -> Result<()> {
    let mut conn = self.lock()?;
    let table = T::table();
    let slot = building_slot(settlement_id);

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      &format!("DELETE FROM {} WHERE slot = ?", table.name()),
      params![slot],
    )
    .map_err(|e| eyre!("Failed to clear buildings of settlement {}: {}", settlement_id, e))?;

    insert_rows(&tx, table, &slot, records, 0, metadata.last_updated)?;

    tx.execute(
      "INSERT OR REPLACE INTO settlement_map_metadata
         (settlement_id, building_hash, building_count, last_updated)
       VALUES (?, ?, ?, ?)",
      params![
        metadata.settlement_id,
        metadata.building_hash,
        metadata.building_count as i64,
        metadata.last_updated
      ],
    )
    .map_err(|e| eyre!("Failed to update map metadata: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get_map_metadata(&self, settlement_id: i64) -> Result<Option<MapMetadata>> {
    let conn = self.lock()?;

    conn
      .query_row(
        "SELECT settlement_id, building_hash, building_count, last_updated
         FROM settlement_map_metadata WHERE settlement_id = ?",
        params![settlement_id],
        |row| {
          let count: i64 = row.get(2)?;
          Ok(MapMetadata {
            settlement_id: row.get(0)?,
            building_hash: row.get(1)?,
            building_count: count.max(0) as usize,
            last_updated: row.get(3)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read map metadata for {}: {}", settlement_id, e))
  }

  fn clear_settlement(&self, settlement_id: i64) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      &format!(
        "DELETE FROM {} WHERE slot = ?",
        Table::SettlementBuildings.name()
      ),
      params![building_slot(settlement_id)],
    )
    .map_err(|e| eyre!("Failed to clear buildings of settlement {}: {}", settlement_id, e))?;

    tx.execute(
      "DELETE FROM settlement_map_metadata WHERE settlement_id = ?",
      params![settlement_id],
    )
    .map_err(|e| eyre!("Failed to clear map metadata of settlement {}: {}", settlement_id, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn clear_category(&self, category: Category) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_metadata WHERE category = ?",
      params![category.as_str()],
    )
    .map_err(|e| eyre!("Failed to clear metadata of category {}: {}", category, e))?;

    for table in category.tables() {
      tx.execute(&format!("DELETE FROM {}", table.name()), [])
        .map_err(|e| eyre!("Failed to clear {}: {}", table.name(), e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn clear_all(&self) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute_batch("DELETE FROM cache_metadata; DELETE FROM settlement_map_metadata;")
      .map_err(|e| eyre!("Failed to clear metadata: {}", e))?;

    for table in Table::ALL {
      tx.execute(&format!("DELETE FROM {}", table.name()), [])
        .map_err(|e| eyre!("Failed to clear {}: {}", table.name(), e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn stats(&self) -> Result<StoreStats> {
    let conn = self.lock()?;

    let mut rows_by_table = Vec::with_capacity(Table::ALL.len());
    for table in Table::ALL {
      let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| {
          row.get(0)
        })
        .map_err(|e| eyre!("Failed to count {}: {}", table.name(), e))?;
      rows_by_table.push((table, count.max(0) as usize));
    }

    let (oldest_fetch, newest_fetch): (Option<Timestamp>, Option<Timestamp>) = conn
      .query_row(
        "SELECT MIN(fetched_at), MAX(fetched_at) FROM cache_metadata",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .map_err(|e| eyre!("Failed to read fetch range: {}", e))?;

    Ok(StoreStats {
      total_rows: rows_by_table.iter().map(|(_, count)| count).sum(),
      rows_by_table,
      oldest_fetch,
      newest_fetch,
    })
  }
}
