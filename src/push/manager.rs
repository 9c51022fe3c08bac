use async_trait::async_trait;
use std::sync::Arc;

use super::platform::{Permission, PushPlatform};
use super::PushSubscription;
use crate::error::{Error, Result};
use crate::store::Store;

/// Server-side mirror of push subscriptions.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
  async fn register_subscription(
    &self,
    token: &str,
    subscription: &PushSubscription,
  ) -> Result<()>;
  async fn unregister_subscription(
    &self,
    token: &str,
    subscription: &PushSubscription,
  ) -> Result<()>;
}

#[async_trait]
impl<R: SubscriptionRegistry + ?Sized> SubscriptionRegistry for Arc<R> {
  async fn register_subscription(
    &self,
    token: &str,
    subscription: &PushSubscription,
  ) -> Result<()> {
    (**self).register_subscription(token, subscription).await
  }

  async fn unregister_subscription(
    &self,
    token: &str,
    subscription: &PushSubscription,
  ) -> Result<()> {
    (**self).unregister_subscription(token, subscription).await
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushState {
  Unsubscribed,
  Subscribed(PushSubscription),
}

/// Drives one push subscription through its lifecycle and keeps the server
/// and the persisted `enabled` flag in step with the platform.
pub struct PushManager<P, R> {
  platform: P,
  registry: R,
  store: Arc<Store>,
  application_server_key: String,
}

impl<P: PushPlatform, R: SubscriptionRegistry> PushManager<P, R> {
  pub fn new(
    platform: P,
    registry: R,
    store: Arc<Store>,
    application_server_key: impl Into<String>,
  ) -> Self {
    Self {
      platform,
      registry,
      store,
      application_server_key: application_server_key.into(),
    }
  }

  /// Current state as reported by the platform. The persisted flag is not consulted.
  pub async fn state(&self) -> Result<PushState> {
    if !self.platform.is_supported() {
      return Ok(PushState::Unsubscribed);
    }
    Ok(match self.platform.get_subscription().await? {
      Some(subscription) => PushState::Subscribed(subscription),
      None => PushState::Unsubscribed,
    })
  }

  pub async fn is_subscribed(&self) -> Result<bool> {
    Ok(matches!(self.state().await?, PushState::Subscribed(_)))
  }

  /// 1. Check platform support and ask for permission
  /// 2. Reuse the live subscription or create one
  /// 3. Register it with the server, rolling back a subscription created here on failure
  /// 4. Persist `enabled = true`
  pub async fn subscribe(&self, token: &str) -> Result<PushSubscription> {
    if !self.platform.is_supported() {
      return Err(Error::NotSupported);
    }

    match self.platform.request_permission().await? {
      Permission::Granted => {}
      _ => return Err(Error::PermissionDenied),
    }

    let (subscription, created) = match self.platform.get_subscription().await? {
      Some(existing) => (existing, false),
      None => (
        self
          .platform
          .subscribe(&self.application_server_key)
          .await?,
        true,
      ),
    };

    if let Err(e) = self.registry.register_subscription(token, &subscription).await {
      if created {
        match self.platform.unsubscribe().await {
          Ok(_) => tracing::info!("rolled back push subscription after registration failure"),
          Err(rollback) => {
            tracing::warn!(error = %rollback, "failed to roll back push subscription")
          }
        }
      }
      return Err(e);
    }

    self.store.set_push_enabled(true).await?;
    tracing::info!(endpoint = %subscription.endpoint, reused = !created, "subscribed to push notifications");
    Ok(subscription)
  }

  /// Remove the subscription from the server, then from the platform.
  /// Succeeds trivially when nothing is subscribed.
  pub async fn unsubscribe(&self, token: &str) -> Result<()> {
    let subscription = match self.state().await? {
      PushState::Subscribed(subscription) => subscription,
      PushState::Unsubscribed => {
        self.store.set_push_enabled(false).await?;
        return Ok(());
      }
    };

    self.registry.unregister_subscription(token, &subscription).await?;
    self.platform.unsubscribe().await?;
    self.store.set_push_enabled(false).await?;
    tracing::info!(endpoint = %subscription.endpoint, "unsubscribed from push notifications");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::push::SubscriptionKeys;
  use crate::store::test_support::store_with_clock;
  use std::sync::Mutex;

  #[derive(Default)]
  struct FakePlatform {
    unsupported: bool,
    permission: Option<Permission>,
    live: Mutex<Option<PushSubscription>>,
    created: Mutex<usize>,
  }

  impl FakePlatform {
    fn granted() -> Self {
      Self {
        permission: Some(Permission::Granted),
        ..Default::default()
      }
    }

    fn with_live(self, subscription: PushSubscription) -> Self {
      *self.live.lock().unwrap() = Some(subscription);
      self
    }
  }

  fn subscription(endpoint: &str) -> PushSubscription {
    PushSubscription {
      endpoint: endpoint.to_string(),
      keys: SubscriptionKeys {
        p256dh: "p".to_string(),
        auth: "a".to_string(),
      },
    }
  }

  #[async_trait]
  impl PushPlatform for FakePlatform {
    fn is_supported(&self) -> bool {
      !self.unsupported
    }

    async fn request_permission(&self) -> Result<Permission> {
      Ok(self.permission.unwrap_or(Permission::Default))
    }

    async fn get_subscription(&self) -> Result<Option<PushSubscription>> {
      Ok(self.live.lock().unwrap().clone())
    }

    async fn subscribe(&self, _key: &str) -> Result<PushSubscription> {
      let mut created = self.created.lock().unwrap();
      *created += 1;
      let new = subscription(&format!("https://push.example.org/{}", created));
      *self.live.lock().unwrap() = Some(new.clone());
      Ok(new)
    }

    async fn unsubscribe(&self) -> Result<bool> {
      Ok(self.live.lock().unwrap().take().is_some())
    }
  }

  #[derive(Default)]
  struct FakeRegistry {
    fail: bool,
    calls: Mutex<Vec<String>>,
  }

  #[async_trait]
  impl SubscriptionRegistry for FakeRegistry {
    async fn register_subscription(
      &self,
      _token: &str,
      subscription: &PushSubscription,
    ) -> Result<()> {
      self
        .calls
        .lock()
        .unwrap()
        .push(format!("register {}", subscription.endpoint));
      if self.fail {
        return Err(Error::Network("offline".into()));
      }
      Ok(())
    }

    async fn unregister_subscription(
      &self,
      _token: &str,
      subscription: &PushSubscription,
    ) -> Result<()> {
      self
        .calls
        .lock()
        .unwrap()
        .push(format!("unregister {}", subscription.endpoint));
      if self.fail {
        return Err(Error::Network("offline".into()));
      }
      Ok(())
    }
  }

  fn manager(
    platform: FakePlatform,
    registry: FakeRegistry,
  ) -> (PushManager<FakePlatform, FakeRegistry>, Arc<Store>) {
    let (store, _) = store_with_clock();
    let store = Arc::new(store);
    (
      PushManager::new(platform, registry, store.clone(), "BCCs2eon"),
      store,
    )
  }

  #[tokio::test]
  async fn test_permission_denied_leaves_everything_untouched() {
    let platform = FakePlatform {
      permission: Some(Permission::Denied),
      ..Default::default()
    };
    let (manager, store) = manager(platform, FakeRegistry::default());

    assert!(matches!(
      manager.subscribe("tok").await,
      Err(Error::PermissionDenied)
    ));
    assert_eq!(manager.state().await.unwrap(), PushState::Unsubscribed);
    assert!(!store.push_enabled().await.unwrap());
    assert!(manager.registry.calls.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_dismissed_prompt_counts_as_denied() {
    let (manager, _) = manager(FakePlatform::default(), FakeRegistry::default());
    assert!(matches!(
      manager.subscribe("tok").await,
      Err(Error::PermissionDenied)
    ));
  }

  #[tokio::test]
  async fn test_unsupported_platform() {
    let platform = FakePlatform {
      unsupported: true,
      ..FakePlatform::granted()
    };
    let (manager, _) = manager(platform, FakeRegistry::default());
    assert!(matches!(manager.subscribe("tok").await, Err(Error::NotSupported)));
    assert!(!manager.is_subscribed().await.unwrap());
  }

  #[tokio::test]
  async fn test_subscribe_then_unsubscribe() {
    let (manager, store) = manager(FakePlatform::granted(), FakeRegistry::default());

    let created = manager.subscribe("tok").await.unwrap();
    assert_eq!(manager.state().await.unwrap(), PushState::Subscribed(created));
    assert!(store.push_enabled().await.unwrap());

    manager.unsubscribe("tok").await.unwrap();
    assert_eq!(manager.state().await.unwrap(), PushState::Unsubscribed);
    assert!(!store.push_enabled().await.unwrap());
    assert_eq!(
      *manager.registry.calls.lock().unwrap(),
      vec![
        "register https://push.example.org/1",
        "unregister https://push.example.org/1"
      ]
    );
  }

  #[tokio::test]
  async fn test_subscribe_reuses_live_subscription() {
    let existing = subscription("https://push.example.org/existing");
    let platform = FakePlatform::granted().with_live(existing.clone());
    let (manager, _) = manager(platform, FakeRegistry::default());

    assert_eq!(manager.subscribe("tok").await.unwrap(), existing);
    assert_eq!(manager.subscribe("tok").await.unwrap(), existing);
    assert_eq!(*manager.platform.created.lock().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_failed_registration_rolls_back_new_subscription() {
    let registry = FakeRegistry {
      fail: true,
      ..Default::default()
    };
    let (manager, store) = manager(FakePlatform::granted(), registry);

    assert!(manager.subscribe("tok").await.unwrap_err().is_retryable());
    assert_eq!(manager.state().await.unwrap(), PushState::Unsubscribed);
    assert!(!store.push_enabled().await.unwrap());
  }

  #[tokio::test]
  async fn test_failed_registration_keeps_reused_subscription() {
    let existing = subscription("https://push.example.org/existing");
    let registry = FakeRegistry {
      fail: true,
      ..Default::default()
    };
    let (manager, _) = manager(FakePlatform::granted().with_live(existing.clone()), registry);

    assert!(manager.subscribe("tok").await.is_err());
    assert_eq!(manager.state().await.unwrap(), PushState::Subscribed(existing));
  }

  #[tokio::test]
  async fn test_unsubscribe_without_subscription_succeeds() {
    let (manager, _) = manager(FakePlatform::granted(), FakeRegistry::default());
    manager.unsubscribe("tok").await.unwrap();
    assert!(manager.registry.calls.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_server_failure_on_unsubscribe_keeps_subscription() {
    let existing = subscription("https://push.example.org/existing");
    let registry = FakeRegistry {
      fail: true,
      ..Default::default()
    };
    let (manager, _) = manager(FakePlatform::granted().with_live(existing.clone()), registry);

    assert!(manager.unsubscribe("tok").await.is_err());
    assert!(manager.is_subscribed().await.unwrap());
  }
}
