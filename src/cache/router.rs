//! Ordered classification of requests into cache routes.

use url::{Origin, Url};

use super::traits::{Partition, Strategy};
use crate::config::CacheConfig;
use crate::http::{Destination, Method, Request};

pub const API_PARTITION: &str = "api-cache";
pub const IMAGE_PARTITION: &str = "image-cache";
pub const MAP_TILE_PARTITION: &str = "map-tiles";

/// Predicate selecting the requests a route applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
  /// Same scheme, host and port
  Origin(Origin),
  Destination(Destination),
  /// Hostname equal to, or a subdomain of, one of these hosts
  Host(Vec<String>),
}

impl Matcher {
  pub fn matches(&self, request: &Request) -> bool {
    match self {
      Matcher::Origin(origin) => request.url.origin() == *origin,
      Matcher::Destination(destination) => request.destination == *destination,
      Matcher::Host(hosts) => request
        .url
        .host_str()
        .map(|host| {
          hosts.iter().any(|h| {
            host.eq_ignore_ascii_case(h)
              || (host.len() > h.len()
                && host.as_bytes()[host.len() - h.len() - 1] == b'.'
                && host[host.len() - h.len()..].eq_ignore_ascii_case(h))
          })
        })
        .unwrap_or(false),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Route {
  pub matcher: Matcher,
  pub strategy: Strategy,
  pub partition: Partition,
  /// Statuses worth keeping; anything else is served but not stored
  pub cacheable_statuses: &'static [u16],
}

impl Route {
  pub fn is_cacheable(&self, status: u16) -> bool {
    self.cacheable_statuses.contains(&status)
  }
}

/// Routes evaluated top to bottom; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
  routes: Vec<Route>,
}

impl RouteTable {
  pub fn new(routes: Vec<Route>) -> Self {
    Self { routes }
  }

  /// The standard table: API data, then images, then map tiles.
  ///
  /// Story photos are hosted on the API origin, so they land in the API
  /// partition rather than the image partition.
  pub fn standard(api_base: &Url, config: &CacheConfig) -> Self {
    Self::new(vec![
      Route {
        matcher: Matcher::Origin(api_base.origin()),
        strategy: Strategy::NetworkFirst,
        partition: Partition::new(API_PARTITION, config.api),
        cacheable_statuses: &[0, 200],
      },
      Route {
        matcher: Matcher::Destination(Destination::Image),
        strategy: Strategy::CacheFirst,
        partition: Partition::new(IMAGE_PARTITION, config.images),
        cacheable_statuses: &[200],
      },
      Route {
        matcher: Matcher::Host(config.map_tile_hosts.clone()),
        strategy: Strategy::CacheFirst,
        partition: Partition::new(MAP_TILE_PARTITION, config.map_tiles),
        cacheable_statuses: &[200],
      },
    ])
  }

  /// Route for `request`, if any. Only GET requests are ever cached.
  pub fn classify(&self, request: &Request) -> Option<&Route> {
    if request.method != Method::Get {
      return None;
    }
    self.routes.iter().find(|route| route.matcher.matches(request))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Route> {
    self.routes.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Body;

  fn table() -> RouteTable {
    let base = Url::parse("https://story-api.dicoding.dev/v1").unwrap();
    RouteTable::standard(&base, &CacheConfig::default())
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  #[test]
  fn test_api_origin_is_network_first() {
    let table = table();
    let route = table
      .classify(&get("https://story-api.dicoding.dev/v1/stories?location=1"))
      .unwrap();
    assert_eq!(route.partition.name, API_PARTITION);
    assert_eq!(route.strategy, Strategy::NetworkFirst);
    assert!(route.is_cacheable(0));
    assert!(route.is_cacheable(200));
    assert!(!route.is_cacheable(201));
  }

  #[test]
  fn test_api_origin_wins_over_image_destination() {
    let table = table();
    let photo = get("https://story-api.dicoding.dev/images/stories/photo.jpg")
      .with_destination(Destination::Image);
    assert_eq!(table.classify(&photo).unwrap().partition.name, API_PARTITION);

    let elsewhere =
      get("https://cdn.example.org/photo.jpg").with_destination(Destination::Image);
    let route = table.classify(&elsewhere).unwrap();
    assert_eq!(route.partition.name, IMAGE_PARTITION);
    assert_eq!(route.strategy, Strategy::CacheFirst);
  }

  #[test]
  fn test_tile_hosts_match_subdomains() {
    let table = table();
    for url in [
      "https://tile.openstreetmap.org/5/10/12.png",
      "https://a.tile.openstreetmap.org/5/10/12.png",
    ] {
      assert_eq!(
        table.classify(&get(url)).unwrap().partition.name,
        MAP_TILE_PARTITION
      );
    }
    assert!(table
      .classify(&get("https://eviltile.openstreetmap.org.example.com/1.png"))
      .is_none());
    assert!(table.classify(&get("https://nottile.openstreetmap.org/1.png")).is_none());
  }

  #[test]
  fn test_image_destination_on_tile_host_uses_image_partition() {
    let table = table();
    let tile = get("https://tile.openstreetmap.org/1/1/1.png").with_destination(Destination::Image);
    assert_eq!(table.classify(&tile).unwrap().partition.name, IMAGE_PARTITION);
  }

  #[test]
  fn test_non_get_requests_bypass_cache() {
    let table = table();
    let mut post = get("https://story-api.dicoding.dev/v1/stories").with_body(Body::Empty);
    post.method = Method::Post;
    assert!(table.classify(&post).is_none());
  }

  #[test]
  fn test_unknown_requests_are_not_routed() {
    assert!(table().classify(&get("https://example.com/data.json")).is_none());
  }
}
