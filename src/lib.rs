//! Persistent client-side cache and sync layer for the Dusk Meridian game
//! client.

pub mod api;
pub mod cache;
pub mod codex;
pub mod config;
pub mod screen;
pub mod services;
pub mod settlement;

pub use services::CacheServices;
