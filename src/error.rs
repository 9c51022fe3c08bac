//! Error taxonomy shared by the store, cache router, API client, sync and push services.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  /// Transient transport failure; safe to retry.
  #[error("Network error: {0}")]
  Network(String),

  /// Rejected on the client before anything was sent.
  #[error("{0}")]
  Validation(String),

  #[error("Notification permission denied")]
  PermissionDenied,

  #[error("Push notifications not supported")]
  NotSupported,

  /// Local database unavailable or corrupt.
  #[error("Storage error: {0}")]
  Storage(String),

  /// Non-2xx answer from the API. `message` is the server's own text when it sent one.
  #[error("{message}")]
  Server { status: u16, message: String },

  #[error("Story {0} is already in favorites")]
  DuplicateKey(String),

  #[error("Not signed in. Run `storykeep login` first.")]
  Unauthenticated,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  /// Whether a later attempt of the same operation may succeed without user action.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Error::Network(_))
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    Error::Storage(e.to_string())
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    Error::Network(e.to_string())
  }
}
