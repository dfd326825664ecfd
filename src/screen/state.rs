//! Per-slice and per-screen load states.

use crate::cache::CacheSource;

/// The state of one independently loaded slice of a screen.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceState<T> {
  /// Nothing requested yet
  Idle,
  /// First fetch in flight, nothing to show
  Loading,
  /// Data available; a failed background refresh keeps it and records why
  Ready {
    data: T,
    source: CacheSource,
    refresh_error: Option<String>,
  },
  /// Fetch failed with nothing to show
  Failed(String),
}

impl<T> SliceState<T> {
  pub fn ready(data: T, source: CacheSource) -> Self {
    SliceState::Ready {
      data,
      source,
      refresh_error: None,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, SliceState::Loading)
  }

  pub fn is_ready(&self) -> bool {
    matches!(self, SliceState::Ready { .. })
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, SliceState::Failed(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      SliceState::Ready { data, .. } => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      SliceState::Failed(e) => Some(e),
      SliceState::Ready {
        refresh_error: Some(e),
        ..
      } => Some(e),
      _ => None,
    }
  }

  /// Record a failed fetch without discarding data already shown.
  pub fn fail(&mut self, error: String) {
    match self {
      SliceState::Ready { refresh_error, .. } => *refresh_error = Some(error),
      other => *other = SliceState::Failed(error),
    }
  }
}

/// Lifecycle of a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenPhase {
  Idle,
  /// First paint pending
  Loading,
  Rendered { stale: bool },
  /// Something is shown and a refresh is running
  Refreshing,
}
