//! HTTP client for the game server.

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;
use url::Url;

use crate::codex::types::{
  CharacterClass, Continent, Faction, Profession, Region, Resource, Settlement, Skill, Spell,
  Technology, WorldStatistics,
};
use crate::config::ApiConfig;
use crate::screen::{CharacterPosition, SettlementApi};
use crate::settlement::SettlementBuilding;

#[derive(Debug, Deserialize)]
struct ErrorBody {
  code: Option<String>,
  message: String,
}

/// Envelope every game server endpoint wraps its payload in.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
  #[serde(default = "default_success")]
  success: bool,
  data: Option<T>,
  message: Option<String>,
  error: Option<ErrorBody>,
}

fn default_success() -> bool {
  true
}

impl<T> Envelope<T> {
  fn into_data(self, path: &str) -> Result<T> {
    if !self.success {
      let reason = match (self.error, self.message) {
        (Some(ErrorBody { code: Some(code), message }), _) => format!("{} ({})", message, code),
        (Some(ErrorBody { message, .. }), _) => message,
        (None, Some(message)) => message,
        (None, None) => "unknown error".to_string(),
      };
      return Err(eyre!("Game server rejected {}: {}", path, reason));
    }

    self
      .data
      .ok_or_else(|| eyre!("Game server returned no data for {}", path))
  }
}

/// Game server API client.
///
/// No retries; a failed request is handed to the cache layer, which decides
/// whether stale data can stand in.
#[derive(Clone)]
pub struct GameClient {
  client: Client,
  base: Url,
}

impl GameClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base: base_url(&config.base_url)?,
    })
  }

  async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
    let url = self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))?;
    debug!(%url, "GET");

    let response = self
      .client
      .get(url)
      .header(header::ACCEPT, "application/json")
      .query(query)
      .send()
      .await
      .map_err(|e| eyre!("Failed to request {}: {}", path, e))?
      .error_for_status()
      .map_err(|e| eyre!("Request to {} failed: {}", path, e))?;

    let envelope: Envelope<T> = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", path, e))?;

    envelope.into_data(path)
  }

  // --------------------------------------------------------------------------
  // Codex
  // --------------------------------------------------------------------------

  pub async fn character_classes(&self) -> Result<Vec<CharacterClass>> {
    self.get("codex/mechanics/classes", &[]).await
  }

  pub async fn skills(&self) -> Result<Vec<Skill>> {
    self.get("codex/mechanics/skills", &[]).await
  }

  pub async fn spells(&self) -> Result<Vec<Spell>> {
    self.get("codex/mechanics/spells", &[]).await
  }

  pub async fn professions(&self) -> Result<Vec<Profession>> {
    self.get("codex/mechanics/professions", &[]).await
  }

  pub async fn technologies(&self) -> Result<Vec<Technology>> {
    self.get("codex/mechanics/technologies", &[]).await
  }

  pub async fn continents(&self) -> Result<Vec<Continent>> {
    self.get("codex/geography/continents", &[]).await
  }

  pub async fn regions(&self, continent_id: Option<i64>) -> Result<Vec<Region>> {
    let query: Vec<(&str, String)> = continent_id
      .map(|id| ("continentId", id.to_string()))
      .into_iter()
      .collect();
    self.get("codex/geography/regions", &query).await
  }

  pub async fn settlements(
    &self,
    region_id: Option<i64>,
    faction_id: Option<&str>,
  ) -> Result<Vec<Settlement>> {
    let mut query = Vec::new();
    if let Some(id) = region_id {
      query.push(("regionId", id.to_string()));
    }
    if let Some(id) = faction_id {
      query.push(("factionId", id.to_string()));
    }
    self.get("codex/geography/settlements", &query).await
  }

  pub async fn factions(&self) -> Result<Vec<Faction>> {
    self.get("codex/world/factions", &[]).await
  }

  pub async fn resources(&self) -> Result<Vec<Resource>> {
    self.get("codex/world/resources", &[]).await
  }

  pub async fn world_statistics(&self) -> Result<WorldStatistics> {
    self.get("codex/statistics/world", &[]).await
  }
}

impl SettlementApi for GameClient {
  async fn settlement(&self, settlement_id: i64) -> Result<Settlement> {
    self
      .get(&format!("settlements/{}", settlement_id), &[])
      .await
  }

  async fn settlement_buildings(&self, settlement_id: i64) -> Result<Vec<SettlementBuilding>> {
    self
      .get(&format!("settlements/{}/buildings", settlement_id), &[])
      .await
  }

  async fn character_positions(&self, settlement_id: i64) -> Result<Vec<CharacterPosition>> {
    self
      .get(
        &format!("settlements/{}/characters/detailed", settlement_id),
        &[],
      )
      .await
  }
}

/// Parse the configured base URL so relative endpoint paths join under it.
fn base_url(raw: &str) -> Result<Url> {
  let mut raw = raw.trim().to_string();
  if !raw.ends_with('/') {
    raw.push('/');
  }
  Url::parse(&raw).map_err(|e| eyre!("Invalid API base URL {}: {}", raw, e))
}
