//! Push subscription lifecycle and delivered-notification rendering.

mod manager;
mod notification;
mod platform;

use serde::{Deserialize, Serialize};

pub use manager::{PushManager, PushState, SubscriptionRegistry};
pub use notification::{NotificationAction, NotificationContent};
pub use platform::{Permission, PushPlatform, StoredPushPlatform};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
  pub p256dh: String,
  pub auth: String,
}

/// A live push subscription as the push service hands it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
  pub endpoint: String,
  pub keys: SubscriptionKeys,
}
