//! What a settlement screen needs from the game server.

use std::future::Future;

use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::codex::types::Settlement;
use crate::settlement::SettlementBuilding;

/// A character's live position inside a settlement. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterPosition {
  pub character_id: i64,
  pub name: String,
  #[serde(rename = "xCoordinate", default)]
  pub x: f64,
  #[serde(rename = "yCoordinate", default)]
  pub y: f64,
  #[serde(rename = "zCoordinate", default)]
  pub z: f64,
  pub current_action: Option<String>,
  #[serde(default)]
  pub is_player: bool,
}

/// Remote fetches used by [`super::SettlementScreen`].
///
/// No retry or backoff is expected here; the screen surfaces failures per slice.
pub trait SettlementApi: Send + Sync + 'static {
  fn settlement(&self, settlement_id: i64) -> impl Future<Output = Result<Settlement>> + Send;

  fn settlement_buildings(
    &self,
    settlement_id: i64,
  ) -> impl Future<Output = Result<Vec<SettlementBuilding>>> + Send;

  fn character_positions(
    &self,
    settlement_id: i64,
  ) -> impl Future<Output = Result<Vec<CharacterPosition>>> + Send;
}
