//! Remote API client for the game server.

mod client;

pub use client::GameClient;
