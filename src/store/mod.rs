//! Durable local storage for favorites, queued submissions and offline copies.
//!
//! Each public operation is one unit of work against the database: multi-row
//! writes run inside a single transaction. The connection is opened lazily on
//! the first operation, so a `Store` can be constructed before the data
//! directory is known to be writable.

mod cached;
mod favorites;
mod pending;
mod settings;

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::db::Database;

pub use cached::CachedStory;
pub use favorites::{FavoriteRecord, FavoriteSort};
pub use pending::PendingUpload;

pub struct Store {
  db: Database,
  clock: Arc<dyn Clock>,
}

impl Store {
  pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
    Self { db, clock }
  }

  fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }
}

/// Fixed-width UTC timestamp so that text order matches time order.
fn format_time(t: DateTime<Utc>) -> String {
  t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| {
      rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}
