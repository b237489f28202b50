//! ETag response cache
//!
//! The cache middleware stores 200 responses that carry an `ETag` and
//! revalidates them with `If-None-Match`. This module holds the storage side:
//!
//! - [`cache_key`]: normalized method + URL + sorted query, hashed
//! - [`CacheStore`]: backend trait
//! - [`MemoryCacheStore`] and [`FileCacheStore`]: the two backends
//!
//! ```
//! use basecamp_common::cache::{cache_key, CacheEntry, CacheStore, MemoryCacheStore};
//! use url::Url;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryCacheStore::new();
//! let url = Url::parse("https://3.basecampapi.com/999/projects.json").unwrap();
//! let key = cache_key("GET", &url);
//!
//! store.put(CacheEntry::new(&key, "\"v1\"", "[]".into())).await.unwrap();
//! assert_eq!(store.get(&key).await.unwrap().unwrap().etag, "\"v1\"");
//! # });
//! ```

pub mod file;
pub mod key;
pub mod memory;
pub mod stats;
pub mod store;

pub use file::FileCacheStore;
pub use key::{cache_key, normalized_request};
pub use memory::MemoryCacheStore;
pub use stats::CacheStats;
pub use store::{CacheEntry, CacheError, CacheStore};
