//! Cache entry model and the store trait

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stats::CacheStats;
use crate::error::{ErrorClassification, ErrorSeverity};

/// Cache failure
///
/// The cache middleware treats these as misses; they never fail a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(String),

    #[error("cache index is corrupt: {0}")]
    Corrupt(String),

    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl ErrorClassification for CacheError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }
}

/// A stored 200 response plus its validator
///
/// Never expires on its own; replaced by the next 200 with an `ETag`, or
/// removed by `invalidate`/`clear`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub etag: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub stored_at: DateTime<Utc>,
    /// Kept out of the serialized index; file stores write it separately
    #[serde(skip)]
    pub body: Bytes,
}

impl CacheEntry {
    #[must_use]
    pub fn new(key: impl Into<String>, etag: impl Into<String>, body: Bytes) -> Self {
        Self {
            key: key.into(),
            etag: etag.into(),
            status: 200,
            content_type: None,
            stored_at: Utc::now(),
            body,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// ETag cache backend
///
/// Writes are last-write-wins; there is no cross-process locking.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or overwrite the entry under `entry.key`
    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError>;

    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}
