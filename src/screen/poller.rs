//! Fixed-interval background polling tied to an owner's lifetime.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A task that runs `tick` every `period`, starting immediately.
///
/// The task is aborted by [`Poller::stop`] or when the poller is dropped.
pub struct Poller {
  handle: JoinHandle<()>,
}

impl Poller {
  pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let handle = tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      // A slow tick delays the next one instead of bunching them up
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        interval.tick().await;
        tick().await;
      }
    });

    Self { handle }
  }

  pub fn stop(&self) {
    self.handle.abort();
  }

  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }
}

impl Drop for Poller {
  fn drop(&mut self) {
    self.handle.abort();
  }
}
