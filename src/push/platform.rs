use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::{PushSubscription, SubscriptionKeys};
use crate::config::{PermissionSetting, PushConfig};
use crate::error::{Error, Result};
use crate::store::Store;

const SUBSCRIPTION_KEY: &str = "push_subscription";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
  Granted,
  Denied,
  /// The user dismissed the request without answering
  Default,
}

/// The device-side push service.
#[async_trait]
pub trait PushPlatform: Send + Sync {
  fn is_supported(&self) -> bool;

  async fn request_permission(&self) -> Result<Permission>;

  /// The live subscription, if one exists.
  async fn get_subscription(&self) -> Result<Option<PushSubscription>>;

  async fn subscribe(&self, application_server_key: &str) -> Result<PushSubscription>;

  /// Drop the live subscription. Returns false when there was none.
  async fn unsubscribe(&self) -> Result<bool>;
}

/// Push platform backed by a configured push-service endpoint.
///
/// The live subscription is kept in the settings table so that it survives
/// between invocations.
pub struct StoredPushPlatform {
  config: PushConfig,
  store: Arc<Store>,
}

impl StoredPushPlatform {
  pub fn new(config: PushConfig, store: Arc<Store>) -> Self {
    Self { config, store }
  }

  async fn ask(&self) -> Permission {
    prompt(tokio::io::stderr(), BufReader::new(tokio::io::stdin())).await
  }
}

/// Ask on `output` and read a yes/no answer from `input`.
/// Anything unreadable or unclear counts as a dismissed prompt.
async fn prompt<W, R>(mut output: W, mut input: R) -> Permission
where
  W: AsyncWrite + Unpin,
  R: AsyncBufRead + Unpin,
{
  if let Err(e) = output
    .write_all(b"Allow storykeep to receive push notifications? [y/N] ")
    .await
  {
    tracing::warn!(error = %e, "could not show permission prompt");
    return Permission::Default;
  }
  if let Err(e) = output.flush().await {
    tracing::warn!(error = %e, "could not show permission prompt");
    return Permission::Default;
  }

  let mut line = String::new();
  match input.read_line(&mut line).await {
    Ok(_) => match line.trim().to_ascii_lowercase().as_str() {
      "y" | "yes" => Permission::Granted,
      "n" | "no" => Permission::Denied,
      _ => Permission::Default,
    },
    Err(e) => {
      tracing::warn!(error = %e, "could not read permission answer");
      Permission::Default
    }
  }
}

#[async_trait]
impl PushPlatform for StoredPushPlatform {
  fn is_supported(&self) -> bool {
    self
      .config
      .endpoint
      .as_deref()
      .is_some_and(|endpoint| !endpoint.is_empty())
  }

  async fn request_permission(&self) -> Result<Permission> {
    Ok(match self.config.permission {
      PermissionSetting::Granted => Permission::Granted,
      PermissionSetting::Denied => Permission::Denied,
      PermissionSetting::Prompt => self.ask().await,
    })
  }

  async fn get_subscription(&self) -> Result<Option<PushSubscription>> {
    self.store.get_json(SUBSCRIPTION_KEY).await
  }

  async fn subscribe(&self, application_server_key: &str) -> Result<PushSubscription> {
    let endpoint = match self.config.endpoint.as_deref() {
      Some(endpoint) if !endpoint.is_empty() => endpoint,
      _ => return Err(Error::NotSupported),
    };
    if application_server_key.is_empty() {
      return Err(Error::Validation(
        "push.vapid_public_key is not configured".to_string(),
      ));
    }
    if self.config.keys.p256dh.is_empty() || self.config.keys.auth.is_empty() {
      return Err(Error::Validation(
        "push.keys.p256dh and push.keys.auth must be configured".to_string(),
      ));
    }

    let subscription = PushSubscription {
      endpoint: endpoint.to_string(),
      keys: SubscriptionKeys {
        p256dh: self.config.keys.p256dh.clone(),
        auth: self.config.keys.auth.clone(),
      },
    };
    self.store.put_json(SUBSCRIPTION_KEY, &subscription).await?;
    Ok(subscription)
  }

  async fn unsubscribe(&self) -> Result<bool> {
    if self.get_subscription().await?.is_none() {
      return Ok(false);
    }
    self.store.delete_setting(SUBSCRIPTION_KEY).await?;
    Ok(true)
  }
}
