use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest photo the API accepts.
pub const MAX_PHOTO_BYTES: usize = 1024 * 1024;
const MIN_DESCRIPTION_CHARS: usize = 10;

/// A story as served by the API. Immutable once created server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
  pub id: String,
  pub name: String,
  pub description: String,
  pub photo_url: String,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub lat: Option<f64>,
  #[serde(default)]
  pub lon: Option<f64>,
}

/// Signed-in account, as returned by `/login`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
  pub user_id: String,
  pub name: String,
  pub token: String,
}

/// Photo attached to a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
  pub bytes: Vec<u8>,
  pub file_name: String,
  pub mime: String,
}

/// A story submission, before the server has accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStory {
  pub description: String,
  pub photo: Photo,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
}

impl Photo {
  /// Photo read from a file, typed by its extension.
  pub fn from_file(file_name: &str, bytes: Vec<u8>) -> Result<Self> {
    let extension = file_name
      .rsplit_once('.')
      .map(|(_, ext)| ext.to_ascii_lowercase())
      .unwrap_or_default();
    let mime = match extension.as_str() {
      "jpg" | "jpeg" => "image/jpeg",
      "png" => "image/png",
      "gif" => "image/gif",
      "webp" => "image/webp",
      _ => {
        return Err(Error::Validation(format!(
          "{} is not a supported image (jpg, png, gif, webp)",
          file_name
        )))
      }
    };
    Ok(Self {
      bytes,
      file_name: file_name.to_string(),
      mime: mime.to_string(),
    })
  }
}

impl NewStory {
  /// Checks the server would otherwise reject, run before anything is sent or queued.
  pub fn validate(&self) -> Result<()> {
    if self.description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
      return Err(Error::Validation(format!(
        "Description must be at least {} characters",
        MIN_DESCRIPTION_CHARS
      )));
    }
    if self.photo.bytes.is_empty() {
      return Err(Error::Validation("A photo is required".to_string()));
    }
    if self.photo.bytes.len() > MAX_PHOTO_BYTES {
      return Err(Error::Validation("Photo must be at most 1 MB".to_string()));
    }
    if !self.photo.mime.starts_with("image/") {
      return Err(Error::Validation("Photo must be an image".to_string()));
    }

    match (self.lat, self.lon) {
      (None, None) => Ok(()),
      (Some(lat), Some(lon)) => {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
          return Err(Error::Validation(format!(
            "Location {}, {} is out of range",
            lat, lon
          )));
        }
        Ok(())
      }
      _ => Err(Error::Validation(
        "Latitude and longitude must be given together".to_string(),
      )),
    }
  }
}

/// Envelope shared by every API response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope {
  #[serde(default)]
  pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiLoginResponse {
  pub login_result: LoginResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiStoriesResponse {
  #[serde(default)]
  pub list_story: Vec<Story>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiStoryResponse {
  pub story: Story,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::test_support::new_story;

  #[test]
  fn test_story_list_parses_missing_location() {
    let json = r#"{
      "id": "story-1",
      "name": "Dimas",
      "description": "Lorem Ipsum",
      "photoUrl": "https://story-api.dicoding.dev/images/stories/1.png",
      "createdAt": "2022-01-08T06:34:18.598Z"
    }"#;
    let story: Story = serde_json::from_str(json).unwrap();
    assert_eq!(story.lat, None);
    assert_eq!(story.created_at.timestamp_millis(), 1_641_623_658_598);
  }

  #[test]
  fn test_description_is_trimmed_before_length_check() {
    assert!(new_story("   short    ").validate().is_err());
    assert!(new_story("exactly10!").validate().is_ok());
  }

  #[test]
  fn test_photo_limits() {
    let mut story = new_story("A perfectly fine story");
    story.photo.bytes.clear();
    assert!(story.validate().is_err());

    story.photo.bytes = vec![0; MAX_PHOTO_BYTES + 1];
    assert!(story.validate().is_err());

    story.photo.bytes = vec![0; MAX_PHOTO_BYTES];
    assert!(story.validate().is_ok());

    story.photo.mime = "text/plain".to_string();
    assert!(story.validate().is_err());
  }

  #[test]
  fn test_location_must_be_complete_and_in_range() {
    let mut story = new_story("A perfectly fine story");
    story.lat = Some(-6.2);
    assert!(story.validate().is_err());

    story.lon = Some(106.8);
    assert!(story.validate().is_ok());

    story.lat = Some(91.0);
    assert!(matches!(story.validate(), Err(Error::Validation(_))));
  }

  #[test]
  fn test_photo_type_from_extension() {
    assert_eq!(Photo::from_file("me.JPG", vec![1]).unwrap().mime, "image/jpeg");
    assert_eq!(Photo::from_file("map.png", vec![1]).unwrap().mime, "image/png");
    assert!(Photo::from_file("notes.txt", vec![1]).is_err());
    assert!(Photo::from_file("noextension", vec![1]).is_err());
  }
}
