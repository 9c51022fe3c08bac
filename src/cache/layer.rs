//! Cache layer that orchestrates caching logic with network fetching.

use async_trait::async_trait;
use std::sync::Arc;

use super::router::{Route, RouteTable};
use super::storage::CacheStorage;
use super::traits::Strategy;
use crate::clock::Clock;
use crate::error::Result;
use crate::http::{Request, Response, Transport};

/// Transport that applies the route table's caching strategies before
/// handing requests to the inner transport.
///
/// Cache storage failures never fail a request: they are logged and the
/// request proceeds as if the cache were empty.
pub struct CachingTransport<T> {
  inner: T,
  storage: Arc<dyn CacheStorage>,
  routes: RouteTable,
  clock: Arc<dyn Clock>,
}

impl<T: Transport> CachingTransport<T> {
  pub fn new(
    inner: T,
    storage: Arc<dyn CacheStorage>,
    routes: RouteTable,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      inner,
      storage,
      routes,
      clock,
    }
  }

  /// The uncached transport underneath.
  pub fn inner(&self) -> &T {
    &self.inner
  }

  /// Unexpired cached response for `url`, if any.
  fn lookup(&self, route: &Route, url: &str) -> Option<Response> {
    match self.storage.get(route.partition.name, url) {
      Ok(Some(cached)) if route.partition.is_fresh(cached.cached_at, self.clock.now()) => {
        tracing::debug!(partition = route.partition.name, url, "cache hit");
        Some(cached.into_response())
      }
      Ok(Some(_)) => {
        tracing::debug!(partition = route.partition.name, url, "cache entry expired");
        None
      }
      Ok(None) => None,
      Err(e) => {
        tracing::warn!(partition = route.partition.name, error = %e, "cache read failed");
        None
      }
    }
  }

  fn remember(&self, route: &Route, url: &str, response: &Response) {
    if !route.is_cacheable(response.status) {
      return;
    }
    if let Err(e) = self
      .storage
      .put(&route.partition, url, response, self.clock.now())
    {
      tracing::warn!(partition = route.partition.name, error = %e, "cache write failed");
    }
  }

  /// 1. Try the network; store and return the response
  /// 2. If the network is unreachable, return the cached copy
  /// 3. With no cached copy, propagate the network error
  async fn network_first(&self, route: &Route, request: Request) -> Result<Response> {
    let url = request.url.to_string();
    match self.inner.send(request).await {
      Ok(response) => {
        self.remember(route, &url, &response);
        Ok(response)
      }
      Err(e) if e.is_retryable() => match self.lookup(route, &url) {
        Some(cached) => {
          tracing::info!(url, "network unavailable, serving cached response");
          Ok(cached)
        }
        None => Err(e),
      },
      Err(e) => Err(e),
    }
  }

  /// 1. Return an unexpired cached copy if present
  /// 2. Otherwise fetch, store and return
  async fn cache_first(&self, route: &Route, request: Request) -> Result<Response> {
    let url = request.url.to_string();
    if let Some(cached) = self.lookup(route, &url) {
      return Ok(cached);
    }

    let response = self.inner.send(request).await?;
    self.remember(route, &url, &response);
    Ok(response)
  }

  /// Remove physically expired entries from every partition.
  pub fn purge_expired(&self) -> Result<usize> {
    let now = self.clock.now();
    let mut removed = 0;
    for route in self.routes.iter() {
      removed += self.storage.purge_expired(&route.partition, now)?;
    }
    Ok(removed)
  }
}

#[async_trait]
impl<T: Transport> Transport for CachingTransport<T> {
  async fn send(&self, request: Request) -> Result<Response> {
    let route = match self.routes.classify(&request) {
      Some(route) => route,
      None => return self.inner.send(request).await,
    };

    match route.strategy {
      Strategy::NetworkFirst => self.network_first(route, request).await,
      Strategy::CacheFirst => self.cache_first(route, request).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::router::{API_PARTITION, IMAGE_PARTITION, MAP_TILE_PARTITION};
  use crate::cache::storage::{NoopCacheStorage, SqliteCacheStorage};
  use crate::clock::ManualClock;
  use crate::config::CacheConfig;
  use crate::http::testing::{offline, respond, ScriptedTransport};
  use crate::http::{Destination, Method, ResponseSource};
  use chrono::Duration;
  use url::Url;

  struct Fixture {
    transport: CachingTransport<Arc<ScriptedTransport>>,
    network: Arc<ScriptedTransport>,
    storage: Arc<SqliteCacheStorage>,
    clock: Arc<ManualClock>,
  }

  fn fixture() -> Fixture {
    let network = Arc::new(ScriptedTransport::default());
    let storage = Arc::new(SqliteCacheStorage::in_memory().unwrap());
    let clock = Arc::new(ManualClock::new());
    let base = Url::parse("https://story-api.dicoding.dev/v1").unwrap();
    let transport = CachingTransport::new(
      network.clone(),
      storage.clone(),
      RouteTable::standard(&base, &CacheConfig::default()),
      clock.clone(),
    );
    Fixture {
      transport,
      network,
      storage,
      clock,
    }
  }

  fn api(path: &str) -> Request {
    Request::get(Url::parse(&format!("https://story-api.dicoding.dev/v1{}", path)).unwrap())
  }

  fn image(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap()).with_destination(Destination::Image)
  }

  #[tokio::test]
  async fn test_network_first_prefers_network() {
    let f = fixture();
    f.network.push(respond(200, "v1"));
    f.network.push(respond(200, "v2"));

    assert_eq!(f.transport.send(api("/stories")).await.unwrap().body, b"v1");
    let second = f.transport.send(api("/stories")).await.unwrap();
    assert_eq!(second.body, b"v2");
    assert_eq!(second.source, ResponseSource::Network);
    assert_eq!(f.network.calls(), 2);
  }

  #[tokio::test]
  async fn test_network_first_falls_back_to_cache_when_offline() {
    let f = fixture();
    f.network.push(respond(200, "stories"));
    f.transport.send(api("/stories")).await.unwrap();

    f.network.push(offline());
    let served = f.transport.send(api("/stories")).await.unwrap();
    assert_eq!(served.body, b"stories");
    assert_eq!(served.source, ResponseSource::Cache);
  }

  #[tokio::test]
  async fn test_network_first_propagates_error_without_cache() {
    let f = fixture();
    f.network.push(offline());
    let err = f.transport.send(api("/stories")).await.unwrap_err();
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn test_network_first_does_not_cache_error_statuses() {
    let f = fixture();
    f.network.push(respond(500, "boom"));
    let response = f.transport.send(api("/stories")).await.unwrap();
    assert_eq!(response.status, 500);
    assert_eq!(f.storage.len(API_PARTITION).unwrap(), 0);

    f.network.push(offline());
    assert!(f.transport.send(api("/stories")).await.is_err());
  }

  #[tokio::test]
  async fn test_network_first_ignores_expired_copy() {
    let f = fixture();
    f.network.push(respond(200, "stories"));
    f.transport.send(api("/stories")).await.unwrap();

    f.clock.advance(Duration::hours(25));
    f.network.push(offline());
    assert!(f.transport.send(api("/stories")).await.is_err());
  }

  #[tokio::test]
  async fn test_cache_first_serves_hit_without_network() {
    let f = fixture();
    f.network.push(respond(200, "png"));
    let url = "https://cdn.example.org/a.png";

    let first = f.transport.send(image(url)).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    let second = f.transport.send(image(url)).await.unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.body, b"png");
    assert_eq!(f.network.calls(), 1);
  }

  #[tokio::test]
  async fn test_cache_first_refetches_after_max_age() {
    let f = fixture();
    let url = "https://cdn.example.org/a.png";
    f.network.push(respond(200, "old"));
    f.transport.send(image(url)).await.unwrap();

    f.clock.advance(Duration::days(31));
    f.network.push(respond(200, "new"));
    let response = f.transport.send(image(url)).await.unwrap();
    assert_eq!(response.body, b"new");
    assert_eq!(response.source, ResponseSource::Network);
    assert_eq!(f.network.calls(), 2);
  }

  #[tokio::test]
  async fn test_cache_first_does_not_store_errors() {
    let f = fixture();
    let url = "https://tile.openstreetmap.org/3/4/2.png";
    f.network.push(respond(404, "missing"));
    f.transport
      .send(Request::get(Url::parse(url).unwrap()))
      .await
      .unwrap();
    assert_eq!(f.storage.len(MAP_TILE_PARTITION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_partition_never_exceeds_bound() {
    let f = fixture();
    for n in 0..201 {
      f.network.push(respond(200, "img"));
      f.transport
        .send(image(&format!("https://cdn.example.org/{}.png", n)))
        .await
        .unwrap();
      assert!(f.storage.len(IMAGE_PARTITION).unwrap() <= 200);
    }
    assert_eq!(f.storage.len(IMAGE_PARTITION).unwrap(), 200);
    assert_eq!(f.storage.len(API_PARTITION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_unrouted_and_non_get_requests_pass_through() {
    let f = fixture();
    f.network.push(respond(201, "{}"));
    let mut post = api("/stories");
    post.method = Method::Post;
    f.transport.send(post).await.unwrap();
    assert_eq!(f.storage.len(API_PARTITION).unwrap(), 0);

    f.network.push(respond(200, "{}"));
    f.transport
      .send(Request::get(Url::parse("https://example.com/x").unwrap()))
      .await
      .unwrap();
    assert_eq!(f.network.calls(), 2);
  }

  #[tokio::test]
  async fn test_purge_expired_covers_all_partitions() {
    let f = fixture();
    f.network.push(respond(200, "a"));
    f.transport.send(api("/stories")).await.unwrap();
    f.network.push(respond(200, "i"));
    f.transport
      .send(image("https://cdn.example.org/a.png"))
      .await
      .unwrap();

    f.clock.advance(Duration::days(2));
    assert_eq!(f.transport.purge_expired().unwrap(), 1);
    assert_eq!(f.storage.len(IMAGE_PARTITION).unwrap(), 1);
  }

  #[tokio::test]
  async fn test_disabled_cache_is_network_only() {
    let network = Arc::new(ScriptedTransport::default());
    let base = Url::parse("https://story-api.dicoding.dev/v1").unwrap();
    let transport = CachingTransport::new(
      network.clone(),
      Arc::new(NoopCacheStorage),
      RouteTable::standard(&base, &CacheConfig::default()),
      Arc::new(ManualClock::new()),
    );
    network.push(respond(200, "png"));
    network.push(respond(200, "png"));
    let url = "https://cdn.example.org/a.png";
    transport.send(image(url)).await.unwrap();
    transport.send(image(url)).await.unwrap();
    assert_eq!(network.calls(), 2);
  }
}
