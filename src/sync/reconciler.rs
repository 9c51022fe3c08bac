use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::store::{PendingUpload, Store};

/// Tag of the deferred-sync signal meant for this reconciler.
pub const SYNC_TAG: &str = "sync-stories";

/// Delivers one queued submission to the server.
#[async_trait]
pub trait StoryUploader: Send + Sync {
  async fn upload(&self, upload: &PendingUpload) -> Result<()>;
}

#[async_trait]
impl<U: StoryUploader + ?Sized> StoryUploader for Arc<U> {
  async fn upload(&self, upload: &PendingUpload) -> Result<()> {
    (**self).upload(upload).await
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
  /// The user asked for it
  Manual,
  ConnectivityRestored,
  /// Deferred platform signal; only [`SYNC_TAG`] is acted on
  Background { tag: String },
  /// Start-up check, skipped when offline or nothing is queued
  PageLoad,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub synced: Vec<i64>,
  pub failed: Vec<(i64, String)>,
  /// Pending uploads left after the pass
  pub remaining: usize,
}

impl SyncReport {
  pub fn is_drained(&self) -> bool {
    self.remaining == 0
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  Completed(SyncReport),
  /// Another pass was already in progress
  AlreadyRunning,
  Skipped,
}

/// Resets the in-flight flag when a pass ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct SyncReconciler<U> {
  store: Arc<Store>,
  uploader: U,
  in_flight: AtomicBool,
}

impl<U: StoryUploader> SyncReconciler<U> {
  pub fn new(store: Arc<Store>, uploader: U) -> Self {
    Self {
      store,
      uploader,
      in_flight: AtomicBool::new(false),
    }
  }

  pub async fn trigger(&self, trigger: SyncTrigger, online: bool) -> Result<SyncOutcome> {
    match &trigger {
      SyncTrigger::Background { tag } if tag != SYNC_TAG => {
        tracing::debug!(tag = %tag, "ignoring background signal");
        return Ok(SyncOutcome::Skipped);
      }
      SyncTrigger::PageLoad => {
        if !online || self.store.pending_count().await? == 0 {
          return Ok(SyncOutcome::Skipped);
        }
      }
      _ => {}
    }

    tracing::debug!(?trigger, "starting sync pass");
    self.run().await
  }

  /// One reconciliation pass over every pending upload, oldest first.
  ///
  /// A failed item stays queued and does not stop the pass. Only one pass
  /// runs at a time; a concurrent call returns [`SyncOutcome::AlreadyRunning`].
  pub async fn run(&self) -> Result<SyncOutcome> {
    if self
      .in_flight
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return Ok(SyncOutcome::AlreadyRunning);
    }
    let _guard = InFlight(&self.in_flight);

    let pending = self.store.list_pending_uploads().await?;
    let mut report = SyncReport::default();

    for upload in &pending {
      match self.uploader.upload(upload).await {
        Ok(()) => match self.store.delete_pending_upload(upload.local_id).await {
          Ok(_) => report.synced.push(upload.local_id),
          Err(e) => {
            tracing::error!(local_id = upload.local_id, error = %e, "uploaded story could not be dequeued");
            report.failed.push((upload.local_id, e.to_string()));
          }
        },
        Err(e) => {
          tracing::error!(local_id = upload.local_id, error = %e, "failed to sync story");
          report.failed.push((upload.local_id, e.to_string()));
        }
      }
    }

    report.remaining = self.store.pending_count().await?;
    tracing::info!(
      synced = report.synced.len(),
      failed = report.failed.len(),
      remaining = report.remaining,
      "sync pass finished"
    );
    Ok(SyncOutcome::Completed(report))
  }
}
