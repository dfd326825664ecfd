//! Codex data: game mechanics, geography, world data and lore.

mod cache;
mod service;
pub mod types;

pub use cache::{CodexKey, WORLD_STATISTICS_ID};
pub use service::CodexCacheService;
