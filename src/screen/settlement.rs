//! Settlement detail screen: stale-first paint, parallel refresh, layout
//! change detection and live character polling.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use color_eyre::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheResult, CacheSource, CacheStorage};
use crate::codex::types::Settlement;
use crate::codex::CodexCacheService;
use crate::config::ScreenConfig;
use crate::services::CacheServices;
use crate::settlement::{ComparisonResult, SettlementBuilding, SettlementCacheService};

use super::poller::Poller;
use super::remote::{CharacterPosition, SettlementApi};
use super::state::{ScreenPhase, SliceState};

/// The independently loaded parts of the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
  Settlement,
  Buildings,
  Characters,
}

/// Visible changes, published as they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
  Phase(ScreenPhase),
  SettlementUpdated,
  /// The layout really changed; the "updating" indicator is now on
  LayoutChanged { summary: String },
  CharactersUpdated { count: usize },
  SliceFailed { slice: Slice, error: String },
  IndicatorCleared,
}

/// Everything the screen currently shows.
#[derive(Debug, Clone)]
pub struct ScreenView {
  pub phase: ScreenPhase,
  pub settlement: SliceState<Settlement>,
  pub buildings: SliceState<Vec<SettlementBuilding>>,
  pub characters: SliceState<Vec<CharacterPosition>>,
  pub layout_updating: bool,
  pub last_change: Option<String>,
}

impl Default for ScreenView {
  fn default() -> Self {
    Self {
      phase: ScreenPhase::Idle,
      settlement: SliceState::Idle,
      buildings: SliceState::Idle,
      characters: SliceState::Idle,
      layout_updating: false,
      last_change: None,
    }
  }
}

impl ScreenView {
  /// True only when there is neither cached nor fresh data for the settlement.
  pub fn is_blocked(&self) -> bool {
    self.settlement.is_failed()
  }
}

/// Result of a [`SettlementScreen::load`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
  Completed,
  /// Another load was already running; this one did nothing
  Skipped,
  /// The screen was unmounted while fetching; nothing was shown
  Cancelled,
}

/// Clears the in-flight flag however the load ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self(flag))
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

/// View state shared with the poller and indicator tasks.
struct Shared {
  view: Mutex<ScreenView>,
  events: mpsc::UnboundedSender<ScreenEvent>,
}

impl Shared {
  fn view(&self) -> MutexGuard<'_, ScreenView> {
    self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn emit(&self, event: ScreenEvent) {
    // Nobody listening is fine
    let _ = self.events.send(event);
  }

  fn set_phase(&self, phase: ScreenPhase) {
    self.view().phase = phase;
    self.emit(ScreenEvent::Phase(phase));
  }

  fn apply_characters(&self, result: Result<Vec<CharacterPosition>>) {
    match result {
      Ok(characters) => {
        let count = characters.len();
        self.view().characters = SliceState::ready(characters, CacheSource::Network);
        self.emit(ScreenEvent::CharactersUpdated { count });
      }
      Err(e) => {
        warn!(error = %e, "Failed to load character positions");
        self.view().characters.fail(e.to_string());
        self.emit(ScreenEvent::SliceFailed {
          slice: Slice::Characters,
          error: e.to_string(),
        });
      }
    }
  }
}

/// Load orchestration for one settlement screen instance.
pub struct SettlementScreen<S: CacheStorage + 'static, A: SettlementApi> {
  settlement_id: i64,
  codex: Arc<CodexCacheService<S>>,
  layouts: Arc<SettlementCacheService<S>>,
  api: Arc<A>,
  config: ScreenConfig,
  shared: Arc<Shared>,
  in_flight: AtomicBool,
  /// Bumped on unmount so loads started before it drop their results
  generation: AtomicU64,
  poller: Mutex<Option<Poller>>,
  indicator: Mutex<Option<JoinHandle<()>>>,
}

impl<S: CacheStorage + 'static, A: SettlementApi> SettlementScreen<S, A> {
  /// Create the screen and the receiver of its events.
  pub fn new(
    settlement_id: i64,
    services: &CacheServices<S>,
    api: Arc<A>,
    config: ScreenConfig,
  ) -> (Self, mpsc::UnboundedReceiver<ScreenEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let screen = Self {
      settlement_id,
      codex: Arc::clone(&services.codex),
      layouts: Arc::clone(&services.settlements),
      api,
      config,
      shared: Arc::new(Shared {
        view: Mutex::new(ScreenView::default()),
        events: tx,
      }),
      in_flight: AtomicBool::new(false),
      generation: AtomicU64::new(0),
      poller: Mutex::new(None),
      indicator: Mutex::new(None),
    };
    (screen, rx)
  }

  pub fn settlement_id(&self) -> i64 {
    self.settlement_id
  }

  /// Snapshot of what the screen shows.
  pub fn view(&self) -> ScreenView {
    self.shared.view().clone()
  }

  pub fn is_blocked(&self) -> bool {
    self.shared.view().is_blocked()
  }

  pub fn is_loading(&self) -> bool {
    self.in_flight.load(Ordering::Acquire)
  }

  pub fn is_polling(&self) -> bool {
    lock(&self.poller)
      .as_ref()
      .is_some_and(|poller| !poller.is_finished())
  }

  /// Paint from cache, then refresh every slice in parallel.
  ///
  /// A call made while another load is running returns
  /// [`LoadOutcome::Skipped`] without doing anything.
  pub async fn load(&self) -> LoadOutcome {
    let Some(_guard) = InFlight::acquire(&self.in_flight) else {
      debug!(settlement_id = self.settlement_id, "Load already in flight, skipping");
      return LoadOutcome::Skipped;
    };
    let generation = self.generation.load(Ordering::Acquire);

    let idle = self.shared.view().phase == ScreenPhase::Idle;
    if idle {
      self.shared.set_phase(ScreenPhase::Loading);
    }

    if self.paint_cached() {
      self.shared.set_phase(ScreenPhase::Rendered { stale: true });
    }
    let shown = self.shared.view().settlement.is_ready();
    if shown {
      self.shared.set_phase(ScreenPhase::Refreshing);
    } else {
      self.mark_loading();
    }

    let id = self.settlement_id;
    let settlement_key = id.to_string();
    let api = &self.api;

    let (settlement, layout, characters) = tokio::join!(
      self
        .codex
        .settlement(&settlement_key, || api.settlement(id)),
      self
        .layouts
        .refresh_layout(id, || api.settlement_buildings(id)),
      api.character_positions(id),
    );

    if self.generation.load(Ordering::Acquire) != generation {
      debug!(settlement_id = id, "Screen unmounted during load, dropping results");
      return LoadOutcome::Cancelled;
    }

    self.apply_settlement(settlement);
    self.apply_layout(layout);
    self.shared.apply_characters(characters);

    let stale = !matches!(
      self.shared.view().settlement,
      SliceState::Ready {
        source: CacheSource::Network | CacheSource::CacheFresh,
        ..
      }
    );
    self.shared.set_phase(ScreenPhase::Rendered { stale });

    LoadOutcome::Completed
  }

  /// Start polling character positions. Replaces a running poller.
  pub fn mount(&self) {
    let shared = Arc::clone(&self.shared);
    let api = Arc::clone(&self.api);
    let id = self.settlement_id;

    let poller = Poller::spawn(self.config.poll_interval(), move || {
      let shared = Arc::clone(&shared);
      let api = Arc::clone(&api);
      async move {
        let result = api.character_positions(id).await;
        shared.apply_characters(result);
      }
    });

    *lock(&self.poller) = Some(poller);
    debug!(settlement_id = id, "Screen mounted");
  }

  /// Stop every background task and return to idle.
  pub fn unmount(&self) {
    self.generation.fetch_add(1, Ordering::AcqRel);
    if let Some(poller) = lock(&self.poller).take() {
      poller.stop();
    }
    if let Some(indicator) = lock(&self.indicator).take() {
      indicator.abort();
    }
    self.shared.view().layout_updating = false;
    self.shared.set_phase(ScreenPhase::Idle);
    debug!(settlement_id = self.settlement_id, "Screen unmounted");
  }

  /// Show cached settlement and layout before any network call.
  fn paint_cached(&self) -> bool {
    let mut painted = false;

    match self.codex.peek_settlement(&self.settlement_id.to_string()) {
      Ok(Some(cached)) => {
        let mut view = self.shared.view();
        if !view.settlement.is_ready() {
          view.settlement = SliceState::ready(cached.data, cached.source);
          painted = true;
        }
      }
      Ok(None) => {}
      Err(e) => warn!(error = %e, "Failed to read cached settlement"),
    }

    match self.layouts.cached_buildings(self.settlement_id) {
      Ok(buildings) if !buildings.is_empty() => {
        let mut view = self.shared.view();
        if !view.buildings.is_ready() {
          view.buildings = SliceState::ready(buildings, CacheSource::CacheStale);
          painted = true;
        }
      }
      Ok(_) => {}
      Err(e) => warn!(error = %e, "Failed to read cached buildings"),
    }

    painted
  }

  fn mark_loading(&self) {
    let mut view = self.shared.view();
    if !view.settlement.is_ready() {
      view.settlement = SliceState::Loading;
    }
    if !view.buildings.is_ready() {
      view.buildings = SliceState::Loading;
    }
    if !view.characters.is_ready() {
      view.characters = SliceState::Loading;
    }
  }

  fn apply_settlement(&self, result: Result<CacheResult<Settlement>>) {
    match result {
      Ok(result) => {
        self.shared.view().settlement = SliceState::ready(result.data, result.source);
        self.shared.emit(ScreenEvent::SettlementUpdated);
      }
      Err(e) => {
        warn!(settlement_id = self.settlement_id, error = %e, "Failed to load settlement");
        self.shared.view().settlement.fail(e.to_string());
        self.shared.emit(ScreenEvent::SliceFailed {
          slice: Slice::Settlement,
          error: e.to_string(),
        });
      }
    }
  }

  fn apply_layout(&self, result: Result<ComparisonResult>) {
    match result {
      Ok(comparison) => {
        let summary = comparison.changes_summary();
        {
          let mut view = self.shared.view();
          if summary.is_some() || !view.buildings.is_ready() {
            view.buildings = SliceState::ready(comparison.buildings, CacheSource::Network);
          } else if let SliceState::Ready { refresh_error, .. } = &mut view.buildings {
            *refresh_error = None;
          }
        }

        if let Some(summary) = summary {
          {
            let mut view = self.shared.view();
            view.layout_updating = true;
            view.last_change = Some(summary.clone());
          }
          self.shared.emit(ScreenEvent::LayoutChanged { summary });
          self.schedule_indicator_clear();
        }
      }
      Err(e) => {
        warn!(settlement_id = self.settlement_id, error = %e, "Failed to refresh buildings");
        self.shared.view().buildings.fail(e.to_string());
        self.shared.emit(ScreenEvent::SliceFailed {
          slice: Slice::Buildings,
          error: e.to_string(),
        });
      }
    }
  }

  fn schedule_indicator_clear(&self) {
    let shared = Arc::clone(&self.shared);
    let delay = self.config.indicator_clear();

    let handle = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      shared.view().layout_updating = false;
      shared.emit(ScreenEvent::IndicatorCleared);
    });

    if let Some(previous) = lock(&self.indicator).replace(handle) {
      previous.abort();
    }
  }
}

impl<S: CacheStorage + 'static, A: SettlementApi> Drop for SettlementScreen<S, A> {
  fn drop(&mut self) {
    if let Some(indicator) = lock(&self.indicator).take() {
      indicator.abort();
    }
    // The poller aborts itself when dropped
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  use color_eyre::eyre::eyre;

  use super::*;
  use crate::cache::{ManualClock, SqliteStorage, TtlPolicy};
  use crate::settlement::MissingFieldPolicy;

  #[derive(Default)]
  struct FakeApi {
    settlement_calls: AtomicUsize,
    building_calls: AtomicUsize,
    character_calls: AtomicUsize,
    fail_settlement: AtomicBool,
    fail_buildings: AtomicBool,
    buildings: Mutex<Vec<SettlementBuilding>>,
  }

  impl FakeApi {
    fn set_buildings(&self, buildings: Vec<SettlementBuilding>) {
      *lock(&self.buildings) = buildings;
    }
  }

  fn settlement(id: i64) -> Settlement {
    Settlement {
      id: id.to_string(),
      name: "Emberfall".to_string(),
      kind: "city".to_string(),
      population: 1200,
      faction_id: None,
      faction_name: None,
      region_id: Some(3),
      region_name: None,
      description: None,
      founded: None,
      is_capital: Some(true),
    }
  }

  fn building(id: i64, active: bool) -> SettlementBuilding {
    SettlementBuilding {
      settlement_building_id: None,
      building_id: id,
      settlement_id: 21,
      name: format!("Building {}", id),
      kind: "forge".to_string(),
      x: Some(10.0),
      y: Some(20.0),
      z: Some(0.0),
      is_destroyed: false,
      is_damaged: false,
      is_active: active,
      prefab_path: None,
      prefab_name: None,
      health: None,
      level: None,
      workers: None,
    }
  }

  impl SettlementApi for FakeApi {
    async fn settlement(&self, settlement_id: i64) -> Result<Settlement> {
      self.settlement_calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(100)).await;
      if self.fail_settlement.load(Ordering::SeqCst) {
        return Err(eyre!("settlement endpoint unavailable"));
      }
      Ok(settlement(settlement_id))
    }

    async fn settlement_buildings(&self, _settlement_id: i64) -> Result<Vec<SettlementBuilding>> {
      self.building_calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(100)).await;
      if self.fail_buildings.load(Ordering::SeqCst) {
        return Err(eyre!("buildings endpoint unavailable"));
      }
      Ok(lock(&self.buildings).clone())
    }

    async fn character_positions(&self, _settlement_id: i64) -> Result<Vec<CharacterPosition>> {
      self.character_calls.fetch_add(1, Ordering::SeqCst);
      Ok(vec![CharacterPosition {
        character_id: 1,
        name: "Mara".to_string(),
        x: 1.0,
        y: 2.0,
        z: 0.0,
        current_action: None,
        is_player: true,
      }])
    }
  }

  fn services() -> CacheServices<SqliteStorage> {
    CacheServices::new(
      Arc::new(SqliteStorage::in_memory().unwrap()),
      Arc::new(ManualClock::new(0)),
      TtlPolicy::default(),
      MissingFieldPolicy::Ignore,
    )
  }

  fn config() -> ScreenConfig {
    ScreenConfig {
      poll_interval_secs: 10,
      indicator_clear_ms: 2_000,
    }
  }

  fn drain(rx: &mut mpsc::UnboundedReceiver<ScreenEvent>) -> Vec<ScreenEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
      events.push(event);
    }
    events
  }

  #[tokio::test(start_paused = true)]
  async fn test_overlapping_loads_run_once() {
    let api = Arc::new(FakeApi::default());
    let (screen, _rx) = SettlementScreen::new(21, &services(), Arc::clone(&api), config());

    let (first, second) = tokio::join!(screen.load(), screen.load());

    assert_eq!(first, LoadOutcome::Completed);
    assert_eq!(second, LoadOutcome::Skipped);
    assert_eq!(api.settlement_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.building_calls.load(Ordering::SeqCst), 1);
    assert!(!screen.is_loading());

    // The guard is released, so a later load runs again
    assert_eq!(screen.load().await, LoadOutcome::Completed);
    assert_eq!(api.building_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_slice_does_not_block_the_screen() {
    let api = Arc::new(FakeApi::default());
    api.fail_buildings.store(true, Ordering::SeqCst);
    let (screen, mut rx) = SettlementScreen::new(21, &services(), Arc::clone(&api), config());

    screen.load().await;
    let view = screen.view();

    assert_eq!(view.settlement.data(), Some(&settlement(21)));
    assert!(view.buildings.is_failed());
    assert!(view.characters.is_ready());
    assert!(!view.is_blocked());
    assert_eq!(view.phase, ScreenPhase::Rendered { stale: false });
    assert!(drain(&mut rx).contains(&ScreenEvent::SliceFailed {
      slice: Slice::Buildings,
      error: "buildings endpoint unavailable".to_string(),
    }));
  }

  #[tokio::test(start_paused = true)]
  async fn test_missing_primary_data_blocks_the_screen() {
    let api = Arc::new(FakeApi::default());
    api.fail_settlement.store(true, Ordering::SeqCst);
    let (screen, _rx) = SettlementScreen::new(21, &services(), Arc::clone(&api), config());

    screen.load().await;

    assert!(screen.is_blocked());
    assert!(screen.view().characters.is_ready());
  }

  #[tokio::test(start_paused = true)]
  async fn test_cached_settlement_is_painted_first() {
    let services = services();
    let api = Arc::new(FakeApi::default());
    api.set_buildings(vec![building(5, true)]);

    let (warm, _) = SettlementScreen::new(21, &services, Arc::clone(&api), config());
    warm.load().await;
    drop(warm);

    api.fail_settlement.store(true, Ordering::SeqCst);
    services.codex.force_refresh("settlement-21").unwrap();

    let (screen, mut rx) = SettlementScreen::new(21, &services, Arc::clone(&api), config());
    screen.load().await;

    let phases: Vec<ScreenPhase> = drain(&mut rx)
      .into_iter()
      .filter_map(|event| match event {
        ScreenEvent::Phase(phase) => Some(phase),
        _ => None,
      })
      .collect();
    assert_eq!(
      phases,
      vec![
        ScreenPhase::Loading,
        ScreenPhase::Rendered { stale: true },
        ScreenPhase::Refreshing,
        ScreenPhase::Rendered { stale: true },
      ]
    );

    let view = screen.view();
    assert!(!view.is_blocked());
    assert_eq!(view.buildings.data(), Some(&vec![building(5, true)]));
    assert!(matches!(
      view.settlement,
      SliceState::Ready {
        source: CacheSource::Offline,
        ..
      }
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn test_layout_indicator_only_on_real_change() {
    let services = services();
    let api = Arc::new(FakeApi::default());
    api.set_buildings(vec![building(5, true)]);
    let (screen, mut rx) = SettlementScreen::new(21, &services, Arc::clone(&api), config());

    screen.load().await;
    assert!(screen.view().layout_updating);
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(!screen.view().layout_updating);
    assert!(drain(&mut rx).contains(&ScreenEvent::IndicatorCleared));

    screen.load().await;
    assert!(!screen.view().layout_updating);
    assert!(!drain(&mut rx)
      .iter()
      .any(|event| matches!(event, ScreenEvent::LayoutChanged { .. })));

    api.set_buildings(vec![building(5, false)]);
    screen.load().await;
    let view = screen.view();
    assert!(view.layout_updating);
    assert_eq!(view.last_change.as_deref(), Some("1 modified"));
    assert_eq!(view.buildings.data(), Some(&vec![building(5, false)]));
  }

  #[tokio::test(start_paused = true)]
  async fn test_unmount_stops_polling() {
    let api = Arc::new(FakeApi::default());
    let (screen, _rx) = SettlementScreen::new(21, &services(), Arc::clone(&api), config());

    screen.mount();
    tokio::time::sleep(Duration::from_millis(20_500)).await;
    assert_eq!(api.character_calls.load(Ordering::SeqCst), 3);
    assert!(screen.view().characters.is_ready());

    screen.unmount();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(api.character_calls.load(Ordering::SeqCst), 3);
    assert!(!screen.is_polling());
    assert_eq!(screen.view().phase, ScreenPhase::Idle);
  }

  #[tokio::test(start_paused = true)]
  async fn test_unmount_during_load_leaves_screen_idle() {
    let services = services();
    let api = Arc::new(FakeApi::default());
    api.set_buildings(vec![building(5, true)]);
    let (screen, mut rx) = SettlementScreen::new(21, &services, Arc::clone(&api), config());

    screen.mount();
    let (outcome, _) = tokio::join!(screen.load(), async {
      tokio::time::sleep(Duration::from_millis(50)).await;
      screen.unmount();
    });

    assert_eq!(outcome, LoadOutcome::Cancelled);
    assert!(!screen.is_loading());
    assert!(!screen.is_polling());
    assert!(lock(&screen.indicator).is_none());

    let view = screen.view();
    assert_eq!(view.phase, ScreenPhase::Idle);
    assert!(!view.layout_updating);
    assert!(!view.settlement.is_ready());

    let events = drain(&mut rx);
    assert_eq!(events.last(), Some(&ScreenEvent::Phase(ScreenPhase::Idle)));
    assert!(!events
      .iter()
      .any(|event| matches!(event, ScreenEvent::LayoutChanged { .. })));

    // The fetched layout still reached the cache
    assert!(services.settlements.has_cached_buildings(21).unwrap());

    // A later mount loads normally
    screen.mount();
    assert_eq!(screen.load().await, LoadOutcome::Completed);
    assert!(screen.view().settlement.is_ready());
  }

  #[tokio::test(start_paused = true)]
  async fn test_dropping_the_screen_stops_polling() {
    let api = Arc::new(FakeApi::default());
    let (screen, _rx) = SettlementScreen::new(21, &services(), Arc::clone(&api), config());

    screen.mount();
    tokio::time::sleep(Duration::from_millis(500)).await;
    drop(screen);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(api.character_calls.load(Ordering::SeqCst), 1);
  }
}
