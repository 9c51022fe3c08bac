use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use super::reconciler::{StoryUploader, SyncOutcome, SyncReconciler, SyncTrigger};
use crate::http::{Request, Transport};

/// Whether `url` answers at all. Any HTTP status counts as online.
pub async fn probe<T: Transport + ?Sized>(transport: &T, url: &Url) -> bool {
  match transport.send(Request::get(url.clone())).await {
    Ok(response) => {
      tracing::debug!(status = response.status, "connectivity probe answered");
      true
    }
    Err(e) => {
      tracing::debug!(error = %e, "connectivity probe failed");
      false
    }
  }
}

/// Publishes the current online state to any number of watchers.
pub struct ConnectivityMonitor {
  tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
  pub fn new(online: bool) -> Self {
    let (tx, _) = watch::channel(online);
    Self { tx }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Record a new state; watchers only wake on an actual change.
  pub fn set_online(&self, online: bool) {
    self.tx.send_if_modified(|current| {
      if *current == online {
        return false;
      }
      tracing::info!(online, "connectivity changed");
      *current = online;
      true
    });
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }

  /// Probe `url` every `period` and publish the result. Never returns.
  pub async fn poll<T: Transport + ?Sized>(&self, transport: &T, url: &Url, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
      ticker.tick().await;
      self.set_online(probe(transport, url).await);
    }
  }
}

impl<U: StoryUploader> SyncReconciler<U> {
  /// Run a pass on every offline to online transition until the monitor goes away.
  /// A failed pass is logged and the next reconnect tries again.
  pub async fn run_on_reconnect(&self, mut online: watch::Receiver<bool>) {
    let mut was_online = *online.borrow_and_update();

    while online.changed().await.is_ok() {
      let now_online = *online.borrow_and_update();
      if now_online && !was_online {
        match self.trigger(SyncTrigger::ConnectivityRestored, true).await {
          Ok(SyncOutcome::Completed(report)) if !report.is_drained() => {
            tracing::warn!(remaining = report.remaining, "stories still waiting to sync");
          }
          Ok(_) => {}
          Err(e) => tracing::error!(error = %e, "sync after reconnect failed"),
        }
      }
      was_online = now_online;
    }
  }
}
