//! Delivery of queued offline submissions once the network is back.

mod connectivity;
mod reconciler;

pub use connectivity::{probe, ConnectivityMonitor};
pub use reconciler::{StoryUploader, SyncOutcome, SyncReconciler, SyncReport, SyncTrigger, SYNC_TAG};
