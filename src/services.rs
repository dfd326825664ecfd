//! The cache services, built once at startup and handed to screens.

use std::sync::Arc;

use color_eyre::Result;
use tracing::debug;

use crate::cache::{CacheStorage, Clock, SqliteStorage, SystemClock, TtlPolicy};
use crate::codex::CodexCacheService;
use crate::config::Config;
use crate::settlement::{MissingFieldPolicy, SettlementCacheService};

/// Every cache service over one shared store.
pub struct CacheServices<S: CacheStorage> {
  pub codex: Arc<CodexCacheService<S>>,
  pub settlements: Arc<SettlementCacheService<S>>,
}

impl<S: CacheStorage> CacheServices<S> {
  pub fn new(
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    ttl: TtlPolicy,
    missing_fields: MissingFieldPolicy,
  ) -> Self {
    Self {
      codex: Arc::new(CodexCacheService::new(
        Arc::clone(&storage),
        Arc::clone(&clock),
        ttl,
      )),
      settlements: Arc::new(SettlementCacheService::new(storage, clock, missing_fields)),
    }
  }
}

impl CacheServices<SqliteStorage> {
  /// Open the configured database and build the services on the wall clock.
  pub fn open(config: &Config) -> Result<Self> {
    let storage = match &config.database_path {
      Some(path) => SqliteStorage::open(path)?,
      None => SqliteStorage::open_default()?,
    };
    debug!(path = ?config.database_path, "Opened cache database");

    Ok(Self::new(
      Arc::new(storage),
      Arc::new(SystemClock),
      config.ttl.clone(),
      config.diff.missing_fields,
    ))
  }
}

impl<S: CacheStorage> Clone for CacheServices<S> {
  fn clone(&self) -> Self {
    Self {
      codex: Arc::clone(&self.codex),
      settlements: Arc::clone(&self.settlements),
    }
  }
}
