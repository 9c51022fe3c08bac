use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_time, parse_time, Store};
use crate::api::Story;
use crate::error::Result;

/// Copy of a story kept for offline browsing.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedStory {
  pub story: Story,
  pub cached_at: DateTime<Utc>,
}

const SELECT_CACHED: &str =
  "SELECT id, name, description, photo_url, created_at, lat, lon, cached_at FROM cached_stories";

fn cached_from_row(row: &Row<'_>) -> rusqlite::Result<CachedStory> {
  let created_at: String = row.get(4)?;
  let cached_at: String = row.get(7)?;
  Ok(CachedStory {
    story: Story {
      id: row.get(0)?,
      name: row.get(1)?,
      description: row.get(2)?,
      photo_url: row.get(3)?,
      created_at: parse_time(4, &created_at)?,
      lat: row.get(5)?,
      lon: row.get(6)?,
    },
    cached_at: parse_time(7, &cached_at)?,
  })
}

impl Store {
  /// Upsert stories with a fresh `cached_at`. All rows are written or none are.
  pub async fn cache_stories(&self, stories: &[Story]) -> Result<()> {
    let cached_at = format_time(self.now());
    let mut conn = self.db.lock().await?;
    let tx = conn.transaction()?;
    {
      let mut stmt = tx.prepare(
        "INSERT OR REPLACE INTO cached_stories
           (id, name, description, photo_url, created_at, lat, lon, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
      )?;
      for story in stories {
        stmt.execute(params![
          story.id,
          story.name,
          story.description,
          story.photo_url,
          format_time(story.created_at),
          story.lat,
          story.lon,
          cached_at,
        ])?;
      }
    }
    tx.commit()?;

    tracing::debug!(count = stories.len(), "cached stories for offline viewing");
    Ok(())
  }

  /// Offline copies, newest story first.
  pub async fn list_cached_stories(&self) -> Result<Vec<CachedStory>> {
    let conn = self.db.lock().await?;
    let mut stmt = conn.prepare(&format!("{} ORDER BY created_at DESC", SELECT_CACHED))?;
    let stories = stmt
      .query_map([], cached_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(stories)
  }

  pub async fn get_cached_story(&self, id: &str) -> Result<Option<CachedStory>> {
    let conn = self.db.lock().await?;
    let story = conn
      .query_row(
        &format!("{} WHERE id = ?", SELECT_CACHED),
        params![id],
        cached_from_row,
      )
      .optional()?;
    Ok(story)
  }

  /// Delete copies older than `max_age`; returns how many were removed.
  pub async fn prune_cached_stories(&self, max_age: Duration) -> Result<usize> {
    let Some(cutoff) = self.now().checked_sub_signed(max_age) else {
      return Ok(0);
    };
    let cutoff = format_time(cutoff);
    let conn = self.db.lock().await?;
    let removed = conn.execute(
      "DELETE FROM cached_stories WHERE cached_at < ?",
      params![cutoff],
    )?;
    if removed > 0 {
      tracing::info!(removed, "pruned expired offline stories");
    }
    Ok(removed)
  }
}
