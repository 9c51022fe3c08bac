pub mod schema;

use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::OnceCell;

use crate::error::{Error, Result};

enum Location {
  File(PathBuf),
  Memory,
}

/// Lazily opened SQLite database.
///
/// Nothing touches the disk until the first caller asks for the connection;
/// concurrent first callers await the same initialisation.
pub struct Database {
  location: Location,
  conn: OnceCell<Mutex<Connection>>,
}

impl Database {
  /// Database backed by a file, created (with parent directories) on first use.
  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self {
      location: Location::File(path.into()),
      conn: OnceCell::new(),
    }
  }

  /// Private in-memory database.
  pub fn in_memory() -> Self {
    Self {
      location: Location::Memory,
      conn: OnceCell::new(),
    }
  }

  /// Get the shared connection, opening and migrating it on first call.
  pub async fn connection(&self) -> Result<&Mutex<Connection>> {
    self
      .conn
      .get_or_try_init(|| async { self.open().map(Mutex::new) })
      .await
  }

  /// Lock the connection for one unit of work.
  pub async fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .connection()
      .await?
      .lock()
      .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))
  }

  fn open(&self) -> Result<Connection> {
    let mut conn = match &self.location {
      Location::File(path) => {
        if let Some(parent) = path.parent() {
          std::fs::create_dir_all(parent)
            .map_err(|e| Error::Storage(format!("Failed to create database directory: {}", e)))?;
        }
        tracing::debug!(path = %path.display(), "opening story database");
        Connection::open(path).map_err(|e| {
          Error::Storage(format!("Failed to open database at {}: {}", path.display(), e))
        })?
      }
      Location::Memory => Connection::open_in_memory()?,
    };

    migrate(&mut conn, schema::MIGRATIONS)?;
    Ok(conn)
  }
}

/// Bring `conn` up to `migrations.len()` using `PRAGMA user_version` as the
/// current version. A database newer than the migration list is refused.
pub fn migrate(conn: &mut Connection, migrations: &[&str]) -> Result<()> {
  let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
  let target = migrations.len() as i64;

  if current > target {
    return Err(Error::Storage(format!(
      "Database schema version {} is newer than supported version {}",
      current, target
    )));
  }
  if current == target {
    return Ok(());
  }

  let tx = conn.transaction()?;
  for step in &migrations[current as usize..] {
    tx.execute_batch(step)
      .map_err(|e| Error::Storage(format!("Failed to run migrations: {}", e)))?;
  }
  tx.pragma_update(None, "user_version", target)?;
  tx.commit()?;

  tracing::info!(from = current, to = target, "database migrated");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_concurrent_first_callers_share_one_connection() {
    let db = Database::in_memory();
    let (a, b) = futures::join!(db.connection(), db.connection());
    assert!(std::ptr::eq(a.unwrap(), b.unwrap()));
  }

  #[tokio::test]
  async fn test_schema_version_is_recorded() {
    let db = Database::in_memory();
    let conn = db.lock().await.unwrap();
    let version: i32 = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .unwrap();
    assert_eq!(version, schema::SCHEMA_VERSION);
  }

  #[test]
  fn test_migrate_is_idempotent() {
    let mut conn = Connection::open_in_memory().unwrap();
    migrate(&mut conn, schema::MIGRATIONS).unwrap();
    migrate(&mut conn, schema::MIGRATIONS).unwrap();
    let tables: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('favorites', 'pending_uploads', 'cached_stories', 'settings')",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(tables, 4);
  }

  #[test]
  fn test_newer_schema_is_refused() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "user_version", 99).unwrap();
    let err = migrate(&mut conn, schema::MIGRATIONS).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
  }
}
