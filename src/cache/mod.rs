//! Request-level caching for data, images and map tiles.
//!
//! This module plays the part of an offline proxy in front of the network:
//! - An ordered route table classifies each GET request (first match wins)
//! - Each route owns an independently bounded cache partition
//! - Network-first routes fall back to the cache only when the network is unreachable
//! - Cache-first routes serve unexpired copies without touching the network
//! - Entries past their max age are treated as misses until maintenance purges them

mod layer;
mod router;
mod storage;
mod traits;

pub use layer::CachingTransport;
pub use router::RouteTable;
pub use storage::{CacheStorage, NoopCacheStorage, SqliteCacheStorage};
