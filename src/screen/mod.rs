//! Per-screen load orchestration on top of the caches.
//!
//! A screen paints whatever is cached first, refreshes every slice in
//! parallel, only signals layout changes that really happened, and polls
//! live data for as long as it is mounted.

mod poller;
mod remote;
mod settlement;
mod state;

pub use poller::Poller;
pub use remote::{CharacterPosition, SettlementApi};
pub use settlement::{LoadOutcome, ScreenEvent, ScreenView, SettlementScreen, Slice};
pub use state::{ScreenPhase, SliceState};
