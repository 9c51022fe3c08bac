use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use std::cmp::Ordering;
use std::str::FromStr;

use super::{format_time, parse_time, Store};
use crate::api::Story;
use crate::error::{Error, Result};

/// A story the user saved, with the client time of saving.
#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteRecord {
  pub story: Story,
  pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FavoriteSort {
  /// Most recently saved first
  #[default]
  Newest,
  Oldest,
  /// By author name, case-insensitive
  Name,
}

impl FromStr for FavoriteSort {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "newest" => Ok(Self::Newest),
      "oldest" => Ok(Self::Oldest),
      "name" => Ok(Self::Name),
      other => Err(format!(
        "unknown sort '{}', expected newest, oldest or name",
        other
      )),
    }
  }
}

const SELECT_FAVORITE: &str =
  "SELECT id, name, description, photo_url, created_at, lat, lon, saved_at FROM favorites";

fn favorite_from_row(row: &Row<'_>) -> rusqlite::Result<FavoriteRecord> {
  let created_at: String = row.get(4)?;
  let saved_at: String = row.get(7)?;
  Ok(FavoriteRecord {
    story: Story {
      id: row.get(0)?,
      name: row.get(1)?,
      description: row.get(2)?,
      photo_url: row.get(3)?,
      created_at: parse_time(4, &created_at)?,
      lat: row.get(5)?,
      lon: row.get(6)?,
    },
    saved_at: parse_time(7, &saved_at)?,
  })
}

/// Case-insensitive order with the raw string as tiebreaker, so the result is total.
pub(crate) fn compare_names(a: &str, b: &str) -> Ordering {
  let folded = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<Vec<_>>();
  folded(a).cmp(&folded(b)).then_with(|| a.cmp(b))
}

impl Store {
  /// Save a story as favorite. Saving an id twice is rejected with [`Error::DuplicateKey`].
  pub async fn add_favorite(&self, story: &Story) -> Result<FavoriteRecord> {
    let saved_at = self.now();
    let conn = self.db.lock().await?;

    let inserted = conn.execute(
      "INSERT INTO favorites (id, name, description, photo_url, created_at, lat, lon, saved_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        story.id,
        story.name,
        story.description,
        story.photo_url,
        format_time(story.created_at),
        story.lat,
        story.lon,
        format_time(saved_at),
      ],
    );

    match inserted {
      Ok(_) => Ok(FavoriteRecord {
        story: story.clone(),
        saved_at,
      }),
      Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
        Err(Error::DuplicateKey(story.id.clone()))
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Remove a favorite. Removing an unknown id is not an error.
  pub async fn remove_favorite(&self, id: &str) -> Result<()> {
    let conn = self.db.lock().await?;
    conn.execute("DELETE FROM favorites WHERE id = ?", params![id])?;
    Ok(())
  }

  pub async fn get_favorite(&self, id: &str) -> Result<Option<FavoriteRecord>> {
    let conn = self.db.lock().await?;
    let record = conn
      .query_row(
        &format!("{} WHERE id = ?", SELECT_FAVORITE),
        params![id],
        favorite_from_row,
      )
      .optional()?;
    Ok(record)
  }

  pub async fn is_favorite(&self, id: &str) -> Result<bool> {
    Ok(self.get_favorite(id).await?.is_some())
  }

  /// All favorites in the requested order.
  pub async fn list_favorites(&self, sort: FavoriteSort) -> Result<Vec<FavoriteRecord>> {
    let mut favorites = self.all_favorites().await?;
    match sort {
      FavoriteSort::Newest => favorites.sort_by(|a, b| b.saved_at.cmp(&a.saved_at)),
      FavoriteSort::Oldest => favorites.sort_by(|a, b| a.saved_at.cmp(&b.saved_at)),
      FavoriteSort::Name => favorites.sort_by(|a, b| compare_names(&a.story.name, &b.story.name)),
    }
    Ok(favorites)
  }

  /// Favorites whose name or description contains `query`, ignoring case.
  /// An empty query matches everything.
  pub async fn search_favorites(&self, query: &str) -> Result<Vec<FavoriteRecord>> {
    let favorites = self.all_favorites().await?;
    if query.is_empty() {
      return Ok(favorites);
    }

    let needle = query.to_lowercase();
    Ok(
      favorites
        .into_iter()
        .filter(|f| {
          f.story.name.to_lowercase().contains(&needle)
            || f.story.description.to_lowercase().contains(&needle)
        })
        .collect(),
    )
  }

  async fn all_favorites(&self) -> Result<Vec<FavoriteRecord>> {
    let conn = self.db.lock().await?;
    let mut stmt = conn.prepare(&format!("{} ORDER BY rowid", SELECT_FAVORITE))?;
    let favorites = stmt
      .query_map([], favorite_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(favorites)
  }
}
