//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CachedResponse, Partition};
use crate::db;
use crate::error::{Error, Result};
use crate::http::Response;

/// Trait for cache storage backends.
///
/// Partitions are identified by name and never share entries.
pub trait CacheStorage: Send + Sync {
  /// Look up the entry for `url`, expired or not.
  fn get(&self, partition: &str, url: &str) -> Result<Option<CachedResponse>>;

  /// Upsert the entry for `url`, then evict the oldest entries until the
  /// partition is within `max_entries`. Returns how many were evicted.
  fn put(&self, partition: &Partition, url: &str, response: &Response, now: DateTime<Utc>)
    -> Result<usize>;

  /// Physically remove entries older than the partition's max age.
  fn purge_expired(&self, partition: &Partition, now: DateTime<Utc>) -> Result<usize>;

  /// Number of stored entries in a partition.
  fn len(&self, partition: &str) -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopCacheStorage;

impl CacheStorage for NoopCacheStorage {
  fn get(&self, _partition: &str, _url: &str) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn put(
    &self,
    _partition: &Partition,
    _url: &str,
    _response: &Response,
    _now: DateTime<Utc>,
  ) -> Result<usize> {
    Ok(0) // Discard
  }

  fn purge_expired(&self, _partition: &Partition, _now: DateTime<Utc>) -> Result<usize> {
    Ok(0)
  }

  fn len(&self, _partition: &str) -> Result<usize> {
    Ok(0)
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per cached URL per partition
CREATE TABLE IF NOT EXISTS cache_entries (
    partition TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    PRIMARY KEY (partition, url_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_age
    ON cache_entries(partition, cached_at, seq);
"#;

/// SQLite-based cache storage implementation.
pub struct SqliteCacheStorage {
  conn: Mutex<Connection>,
}

impl SqliteCacheStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Storage(format!("Failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::Storage(format!("Failed to open cache database at {}: {}", path.display(), e))
    })?;

    Self::with_connection(conn)
  }

  #[cfg(test)]
  pub fn in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(mut conn: Connection) -> Result<Self> {
    db::migrate(&mut conn, &[CACHE_SCHEMA])?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))
  }
}

/// SHA256 hash for stable, fixed-length keys.
fn url_key(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
  Utc
    .timestamp_millis_opt(ms)
    .single()
    .ok_or_else(|| Error::Storage(format!("Invalid cache timestamp {}", ms)))
}

impl CacheStorage for SqliteCacheStorage {
  fn get(&self, partition: &str, url: &str) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<(u16, Option<String>, Vec<u8>, i64)> = conn
      .query_row(
        "SELECT status, content_type, body, cached_at FROM cache_entries
         WHERE partition = ? AND url_hash = ?",
        params![partition, url_key(url)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    match row {
      Some((status, content_type, body, cached_at)) => Ok(Some(CachedResponse {
        status,
        content_type,
        body,
        cached_at: from_millis(cached_at)?,
      })),
      None => Ok(None),
    }
  }

  fn put(
    &self,
    partition: &Partition,
    url: &str,
    response: &Response,
    now: DateTime<Utc>,
  ) -> Result<usize> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    let seq: i64 = tx.query_row(
      "SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_entries",
      [],
      |row| row.get(0),
    )?;

    tx.execute(
      "INSERT OR REPLACE INTO cache_entries
         (partition, url_hash, url, status, content_type, body, cached_at, seq)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        partition.name,
        url_key(url),
        url,
        response.status,
        response.content_type,
        response.body,
        now.timestamp_millis(),
        seq,
      ],
    )?;

    let count: i64 = tx.query_row(
      "SELECT COUNT(*) FROM cache_entries WHERE partition = ?",
      params![partition.name],
      |row| row.get(0),
    )?;

    let excess = (count as usize).saturating_sub(partition.max_entries);
    let evicted = if excess > 0 {
      tx.execute(
        "DELETE FROM cache_entries WHERE partition = ?1 AND url_hash IN (
           SELECT url_hash FROM cache_entries WHERE partition = ?1
           ORDER BY cached_at, seq LIMIT ?2
         )",
        params![partition.name, excess as i64],
      )?
    } else {
      0
    };

    tx.commit()?;

    if evicted > 0 {
      tracing::debug!(partition = partition.name, evicted, "evicted oldest cache entries");
    }
    Ok(evicted)
  }

  fn purge_expired(&self, partition: &Partition, now: DateTime<Utc>) -> Result<usize> {
    let conn = self.lock()?;
    // An age reaching past the representable range expires nothing.
    let cutoff = now
      .checked_sub_signed(partition.max_age)
      .map_or(i64::MIN, |t| t.timestamp_millis());
    let removed = conn.execute(
      "DELETE FROM cache_entries WHERE partition = ? AND cached_at < ?",
      params![partition.name, cutoff],
    )?;
    Ok(removed)
  }

  fn len(&self, partition: &str) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM cache_entries WHERE partition = ?",
      params![partition],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }
}
