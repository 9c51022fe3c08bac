use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use super::Store;
use crate::api::LoginResult;
use crate::error::{Error, Result};

const SESSION_KEY: &str = "session";
const PUSH_ENABLED_KEY: &str = "push_notification_enabled";

impl Store {
  pub async fn save_session(&self, session: &LoginResult) -> Result<()> {
    self.put_json(SESSION_KEY, session).await
  }

  /// The signed-in account, if any.
  pub async fn session(&self) -> Result<Option<LoginResult>> {
    self.get_json(SESSION_KEY).await
  }

  pub async fn clear_session(&self) -> Result<()> {
    self.delete_setting(SESSION_KEY).await
  }

  /// Remember the user's push preference. Advisory only: the platform is the
  /// source of truth for whether a subscription exists.
  pub async fn set_push_enabled(&self, enabled: bool) -> Result<()> {
    self.put_json(PUSH_ENABLED_KEY, &enabled).await
  }

  pub async fn push_enabled(&self) -> Result<bool> {
    Ok(self.get_json(PUSH_ENABLED_KEY).await?.unwrap_or(false))
  }

  pub(crate) async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let conn = self.db.lock().await?;
    let raw: Option<String> = conn
      .query_row(
        "SELECT value FROM settings WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;

    raw
      .map(|value| {
        serde_json::from_str(&value)
          .map_err(|e| Error::Storage(format!("Corrupt setting '{}': {}", key, e)))
      })
      .transpose()
  }

  pub(crate) async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_string(value)
      .map_err(|e| Error::Storage(format!("Failed to serialize setting '{}': {}", key, e)))?;
    let conn = self.db.lock().await?;
    conn.execute(
      "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
      params![key, value],
    )?;
    Ok(())
  }

  pub(crate) async fn delete_setting(&self, key: &str) -> Result<()> {
    let conn = self.db.lock().await?;
    conn.execute("DELETE FROM settings WHERE key = ?", params![key])?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::test_support::store_with_clock;

  #[tokio::test]
  async fn test_session_lifecycle() {
    let (store, _) = store_with_clock();
    assert!(store.session().await.unwrap().is_none());

    let session = LoginResult {
      user_id: "user-yj5pc_LARC_AgK61".into(),
      name: "Arif Faizin".into(),
      token: "eyJhbGciOi".into(),
    };
    store.save_session(&session).await.unwrap();
    assert_eq!(store.session().await.unwrap(), Some(session));

    store.clear_session().await.unwrap();
    assert!(store.session().await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_push_flag_defaults_to_false() {
    let (store, _) = store_with_clock();
    assert!(!store.push_enabled().await.unwrap());
    store.set_push_enabled(true).await.unwrap();
    assert!(store.push_enabled().await.unwrap());
    store.set_push_enabled(false).await.unwrap();
    assert!(!store.push_enabled().await.unwrap());
  }
}
