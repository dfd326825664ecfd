use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::TtlPolicy;
use crate::settlement::MissingFieldPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Cache database location (defaults to the XDG data directory)
  pub database_path: Option<PathBuf>,
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub ttl: TtlPolicy,
  #[serde(default)]
  pub screen: ScreenConfig,
  #[serde(default)]
  pub diff: DiffConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  /// Request timeout; the cache layer adds none of its own
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:5105/api/".to_string(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScreenConfig {
  /// How often live character positions are polled
  pub poll_interval_secs: u64,
  /// How long the "layout updated" indicator stays on
  pub indicator_clear_ms: u64,
}

impl Default for ScreenConfig {
  fn default() -> Self {
    Self {
      poll_interval_secs: 10,
      indicator_clear_ms: 2_000,
    }
  }
}

impl ScreenConfig {
  pub fn poll_interval(&self) -> Duration {
    // A zero period would make tokio's interval panic
    Duration::from_secs(self.poll_interval_secs.max(1))
  }

  pub fn indicator_clear(&self) -> Duration {
    Duration::from_millis(self.indicator_clear_ms)
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DiffConfig {
  /// Whether a coordinate missing from a fresh building counts as a change
  #[serde(default)]
  pub missing_fields: MissingFieldPolicy,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./meridian-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/meridian-cache/config.yaml
  ///
  /// Without any file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("meridian-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("meridian-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Directory for the database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|p| p.join("meridian-cache"))
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }
}
