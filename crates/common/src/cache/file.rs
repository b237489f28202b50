//! On-disk cache store
//!
//! Layout under the cache directory:
//! - `etags.json`: key → validator and response metadata
//! - `responses/<key>.body`: raw response body
//!
//! Every file is written atomically with owner-only permissions. Writers in
//! this process are serialized; other processes get last-write-wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::key::is_valid_key;
use super::stats::{CacheStats, MetricsCollector};
use super::store::{CacheEntry, CacheError, CacheStore};
use crate::storage::write_private_atomic;

const INDEX_FILE: &str = "etags.json";
const RESPONSES_DIR: &str = "responses";

type Index = HashMap<String, CacheEntry>;

/// Cache persisted under a directory
#[derive(Debug)]
pub struct FileCacheStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
    metrics: MetricsCollector,
}

impl FileCacheStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_lock: Mutex::new(()), metrics: MetricsCollector::default() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(RESPONSES_DIR).join(format!("{key}.body"))
    }

    async fn read_index(&self) -> Result<Index, CacheError> {
        match tokio::fs::read(self.index_path()).await {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| CacheError::Corrupt(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Index::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(path: PathBuf, data: Vec<u8>) -> Result<(), CacheError> {
        tokio::task::spawn_blocking(move || write_private_atomic(&path, &data))
            .await
            .map_err(|e| CacheError::Io(e.to_string()))??;
        Ok(())
    }

    async fn write_index(&self, index: &Index) -> Result<(), CacheError> {
        let data = serde_json::to_vec(index).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        Self::write_file(self.index_path(), data).await
    }
}

fn check_key(key: &str) -> Result<(), CacheError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        check_key(key)?;
        let Some(mut entry) = self.read_index().await?.remove(key) else {
            self.metrics.record_lookup(false);
            return Ok(None);
        };

        match tokio::fs::read(self.body_path(key)).await {
            Ok(body) => {
                entry.key = key.to_string();
                entry.body = Bytes::from(body);
                self.metrics.record_lookup(true);
                Ok(Some(entry))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(key, "Cache index references a missing body; treating as miss");
                self.metrics.record_lookup(false);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        check_key(&entry.key)?;
        let _guard = self.write_lock.lock().await;

        // Body first: an index entry must never point at a missing body.
        Self::write_file(self.body_path(&entry.key), entry.body.to_vec()).await?;

        let mut index = self.read_index().await.unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable cache index");
            Index::new()
        });
        index.insert(entry.key.clone(), entry);
        self.write_index(&index).await?;

        self.metrics.record_store();
        debug!(dir = %self.dir.display(), entries = index.len(), "Cache entry stored");
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        check_key(key)?;
        let _guard = self.write_lock.lock().await;

        let mut index = self.read_index().await?;
        if index.remove(key).is_some() {
            self.write_index(&index).await?;
            self.metrics.record_invalidation();
        }
        remove_if_exists(&self.body_path(key)).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        remove_if_exists(&self.index_path()).await?;
        match tokio::fs::remove_dir_all(self.dir.join(RESPONSES_DIR)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.metrics.reset();
        debug!(dir = %self.dir.display(), "Cache cleared");
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        let entries = std::fs::read(self.index_path())
            .ok()
            .and_then(|data| serde_json::from_slice::<Index>(&data).ok())
            .map_or(0, |index| index.len());
        self.metrics.snapshot(entries)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::file.
    use tempfile::TempDir;
    use url::Url;

    use super::*;
    use crate::cache::key::cache_key;

    fn key(path: &str) -> String {
        cache_key("GET", &Url::parse(&format!("https://3.basecampapi.com{path}")).unwrap())
    }

    /// Validates persistence across store instances.
    ///
    /// Assertions:
    /// - A second store over the same directory sees the entry.
    /// - Body and metadata survive, the layout is `etags.json` plus a body
    ///   file.
    #[tokio::test]
    async fn test_put_and_get_across_instances() {
        let dir = TempDir::new().unwrap();
        let k = key("/999/projects.json");
        let entry = CacheEntry::new(&k, "\"abc\"", Bytes::from_static(br#"[{"id":1}]"#))
            .with_content_type("application/json");

        FileCacheStore::new(dir.path()).put(entry.clone()).await.unwrap();

        let reopened = FileCacheStore::new(dir.path());
        let loaded = reopened.get(&k).await.unwrap().unwrap();
        assert_eq!(loaded, entry);
        assert!(dir.path().join("etags.json").exists());
        assert!(dir.path().join("responses").join(format!("{k}.body")).exists());
    }

    #[tokio::test]
    async fn test_overwrite_and_invalidate() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());
        let k = key("/999/todos.json");

        store.put(CacheEntry::new(&k, "\"1\"", Bytes::from_static(b"old"))).await.unwrap();
        store.put(CacheEntry::new(&k, "\"2\"", Bytes::from_static(b"new"))).await.unwrap();
        let loaded = store.get(&k).await.unwrap().unwrap();
        assert_eq!((loaded.etag.as_str(), &loaded.body[..]), ("\"2\"", &b"new"[..]));

        store.invalidate(&k).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap(), None);
        assert_eq!(store.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());
        store.clear().await.unwrap();

        let k = key("/999/people.json");
        store.put(CacheEntry::new(&k, "\"1\"", Bytes::new())).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.get(&k).await.unwrap(), None);
        assert_eq!(store.stats().entries, 0);
    }

    /// Validates that a body file removed behind the store's back is a miss.
    #[tokio::test]
    async fn test_missing_body_is_miss() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());
        let k = key("/999/x.json");
        store.put(CacheEntry::new(&k, "\"1\"", Bytes::from_static(b"x"))).await.unwrap();
        std::fs::remove_file(dir.path().join("responses").join(format!("{k}.body"))).unwrap();

        assert_eq!(store.get(&k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let store = FileCacheStore::new(TempDir::new().unwrap().path());
        assert!(matches!(store.get("../../etc/passwd").await, Err(CacheError::InvalidKey(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let k = key("/999/y.json");
        FileCacheStore::new(dir.path()).put(CacheEntry::new(&k, "\"1\"", Bytes::new())).await.unwrap();

        for path in [dir.path().join("etags.json"), dir.path().join("responses").join(format!("{k}.body"))] {
            assert_eq!(std::fs::metadata(path).unwrap().permissions().mode() & 0o777, 0o600);
        }
    }
}
