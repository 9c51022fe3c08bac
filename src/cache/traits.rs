//! Core types for the caching system.

use chrono::{DateTime, Duration, Utc};

use crate::config::PartitionBounds;
use crate::http::{Response, ResponseSource};

/// How a route balances freshness against availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Always try the network; serve the cached copy only if the network is unreachable
  NetworkFirst,
  /// Serve an unexpired cached copy; go to the network only on a miss
  CacheFirst,
}

/// An independently bounded cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
  pub name: &'static str,
  pub max_entries: usize,
  pub max_age: Duration,
}

impl Partition {
  pub fn new(name: &'static str, bounds: PartitionBounds) -> Self {
    Self {
      name,
      max_entries: bounds.max_entries,
      max_age: bounds.max_age(),
    }
  }

  /// Whether an entry written at `cached_at` may still be served at `now`.
  pub fn is_fresh(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - cached_at <= self.max_age
  }
}

/// A response as held in a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
  pub fn into_response(self) -> Response {
    Response {
      status: self.status,
      content_type: self.content_type,
      body: self.body,
      source: ResponseSource::Cache,
    }
  }
}
