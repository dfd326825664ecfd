//! Settlement building layouts and their change detection.

mod diff;
mod service;
mod types;

pub use diff::{dedupe_by_id, diff_layouts, layout_fingerprint, LayoutDiff, MissingFieldPolicy};
pub use service::{ComparisonResult, SettlementCacheService};
pub use types::{CachedSettlementBuilding, SettlementBuilding};
