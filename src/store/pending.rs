use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{format_time, parse_time, Store};
use crate::api::{NewStory, Photo};
use crate::error::Result;

/// A submission queued while the network was unreachable.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
  /// Assigned by the store, strictly increasing
  pub local_id: i64,
  pub description: String,
  pub photo: Photo,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
  /// Bearer token captured at enqueue time; `None` for guest submissions
  pub auth_token: Option<String>,
  pub timestamp: DateTime<Utc>,
  pub synced: bool,
}

impl PendingUpload {
  pub fn to_new_story(&self) -> NewStory {
    NewStory {
      description: self.description.clone(),
      photo: self.photo.clone(),
      lat: self.lat,
      lon: self.lon,
    }
  }
}

fn pending_from_row(row: &Row<'_>) -> rusqlite::Result<PendingUpload> {
  let timestamp: String = row.get(8)?;
  Ok(PendingUpload {
    local_id: row.get(0)?,
    description: row.get(1)?,
    photo: Photo {
      bytes: row.get(2)?,
      file_name: row.get(3)?,
      mime: row.get(4)?,
    },
    lat: row.get(5)?,
    lon: row.get(6)?,
    auth_token: row.get(7)?,
    timestamp: parse_time(8, &timestamp)?,
    synced: row.get(9)?,
  })
}

impl Store {
  /// Queue a submission for later delivery and return its local id.
  pub async fn enqueue_pending_upload(
    &self,
    story: &NewStory,
    auth_token: Option<&str>,
  ) -> Result<i64> {
    let timestamp = self.now();
    let conn = self.db.lock().await?;

    conn.execute(
      "INSERT INTO pending_uploads
         (description, photo, photo_name, photo_mime, lat, lon, auth_token, timestamp, synced)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)",
      params![
        story.description,
        story.photo.bytes,
        story.photo.file_name,
        story.photo.mime,
        story.lat,
        story.lon,
        auth_token,
        format_time(timestamp),
      ],
    )?;

    let local_id = conn.last_insert_rowid();
    tracing::info!(local_id, "queued story for background sync");
    Ok(local_id)
  }

  /// Pending uploads in enqueue order.
  pub async fn list_pending_uploads(&self) -> Result<Vec<PendingUpload>> {
    let conn = self.db.lock().await?;
    let mut stmt = conn.prepare(
      "SELECT local_id, description, photo, photo_name, photo_mime, lat, lon, auth_token, timestamp, synced
       FROM pending_uploads ORDER BY local_id",
    )?;
    let uploads = stmt
      .query_map([], pending_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(uploads)
  }

  pub async fn pending_count(&self) -> Result<usize> {
    let conn = self.db.lock().await?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM pending_uploads", [], |row| row.get(0))?;
    Ok(count as usize)
  }

  /// Delete one pending upload; returns whether it existed.
  pub async fn delete_pending_upload(&self, local_id: i64) -> Result<bool> {
    let conn = self.db.lock().await?;
    let deleted = conn.execute(
      "DELETE FROM pending_uploads WHERE local_id = ?",
      params![local_id],
    )?;
    Ok(deleted > 0)
  }

  pub async fn clear_pending_uploads(&self) -> Result<usize> {
    let conn = self.db.lock().await?;
    Ok(conn.execute("DELETE FROM pending_uploads", [])?)
  }
}

#[cfg(test)]
mod tests {
  use crate::clock::Clock;
  use crate::store::test_support::{new_story, store_with_clock};
  use chrono::Duration;

  #[tokio::test]
  async fn test_enqueue_assigns_monotonic_ids() {
    let (store, clock) = store_with_clock();
    let first = store
      .enqueue_pending_upload(&new_story("first story text"), Some("tok"))
      .await
      .unwrap();
    clock.advance(Duration::seconds(3));
    let second = store
      .enqueue_pending_upload(&new_story("second story text"), Some("tok"))
      .await
      .unwrap();
    assert!(second > first);

    // Ids are never reused, even after the newest one is deleted
    store.delete_pending_upload(second).await.unwrap();
    let third = store
      .enqueue_pending_upload(&new_story("third story text"), None)
      .await
      .unwrap();
    assert!(third > second);
  }

  #[tokio::test]
  async fn test_pending_upload_round_trips_fields() {
    let (store, clock) = store_with_clock();
    let mut story = new_story("A walk around the old town");
    story.lat = Some(-7.25);
    story.lon = Some(112.75);
    let id = store
      .enqueue_pending_upload(&story, Some("bearer-token"))
      .await
      .unwrap();

    let pending = store.list_pending_uploads().await.unwrap();
    assert_eq!(pending.len(), 1);
    let upload = &pending[0];
    assert_eq!(upload.local_id, id);
    assert_eq!(upload.to_new_story(), story);
    assert_eq!(upload.auth_token.as_deref(), Some("bearer-token"));
    assert_eq!(upload.timestamp, clock.now());
    assert!(!upload.synced);
  }

  #[tokio::test]
  async fn test_list_is_in_enqueue_order() {
    let (store, _) = store_with_clock();
    let mut ids = Vec::new();
    for n in 0..4 {
      ids.push(
        store
          .enqueue_pending_upload(&new_story(&format!("story number {}", n)), Some("t"))
          .await
          .unwrap(),
      );
    }
    let listed: Vec<_> = store
      .list_pending_uploads()
      .await
      .unwrap()
      .into_iter()
      .map(|p| p.local_id)
      .collect();
    assert_eq!(listed, ids);
    assert_eq!(store.pending_count().await.unwrap(), 4);
  }

  #[tokio::test]
  async fn test_delete_and_clear() {
    let (store, _) = store_with_clock();
    let a = store
      .enqueue_pending_upload(&new_story("story a text"), Some("t"))
      .await
      .unwrap();
    store
      .enqueue_pending_upload(&new_story("story b text"), Some("t"))
      .await
      .unwrap();

    assert!(store.delete_pending_upload(a).await.unwrap());
    assert!(!store.delete_pending_upload(a).await.unwrap());
    assert_eq!(store.pending_count().await.unwrap(), 1);

    assert_eq!(store.clear_pending_uploads().await.unwrap(), 1);
    assert!(store.list_pending_uploads().await.unwrap().is_empty());
  }
}
