//! Token persistence backends
//!
//! - [`FileTokenStore`]: JSON file, written atomically (temp file + rename)
//!   with owner-only permissions
//! - [`MemoryTokenStore`]: process-local, for tests and short-lived tools
//!
//! The keychain backend lives in `auth::keychain`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::traits::TokenStore;
use super::types::OAuthToken;
use crate::error::{ErrorClassification, ErrorSeverity};
use crate::storage::write_private_atomic;

/// Token storage failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenStoreError {
    #[error("token store I/O error: {0}")]
    Io(String),

    /// Stored data exists but cannot be decoded
    #[error("stored token is corrupt: {0}")]
    Corrupt(String),

    #[error("keychain error: {0}")]
    Keychain(String),
}

impl From<std::io::Error> for TokenStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl ErrorClassification for TokenStoreError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Corrupt(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Token stored as a JSON file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/basecamp/token.json`, else
    /// `~/.config/basecamp/token.json`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("basecamp").join("token.json"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<OAuthToken>, TokenStoreError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let token = serde_json::from_slice(&data).map_err(|e| TokenStoreError::Corrupt(e.to_string()))?;
        debug!(path = %self.path.display(), "Loaded token from file");
        Ok(Some(token))
    }

    async fn save(&self, token: &OAuthToken) -> Result<(), TokenStoreError> {
        let data =
            serde_json::to_vec_pretty(token).map_err(|e| TokenStoreError::Corrupt(e.to_string()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_private_atomic(&path, &data))
            .await
            .map_err(|e| TokenStoreError::Io(e.to_string()))??;
        debug!(path = %self.path.display(), "Saved token to file");
        Ok(())
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<OAuthToken>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: OAuthToken) -> Self {
        Self { token: Mutex::new(Some(token)) }
    }

    /// Current contents without going through the async trait
    #[must_use]
    pub fn snapshot(&self) -> Option<OAuthToken> {
        self.token.lock().clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<OAuthToken>, TokenStoreError> {
        Ok(self.token.lock().clone())
    }

    async fn save(&self, token: &OAuthToken) -> Result<(), TokenStoreError> {
        *self.token.lock() = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        *self.token.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::token_store.
    use tempfile::TempDir;

    use super::*;

    fn sample() -> OAuthToken {
        OAuthToken {
            refresh_token: Some("refresh".into()),
            expires_in: Some(3600),
            expires_at: chrono::DateTime::from_timestamp(1_893_456_000, 0),
            scope: Some("read".into()),
            ..OAuthToken::bearer("access")
        }
    }

    /// Validates that an empty store loads as `None`.
    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    /// Validates save/load through the file, creating parent directories.
    ///
    /// Assertions:
    /// - Loaded token equals the saved one.
    /// - File uses the camelCase persisted format.
    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let store = FileTokenStore::new(&path);

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(sample()));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"accessToken\""));
        assert!(raw.contains("\"refreshToken\""));
    }

    /// Validates owner-only permissions on the token file.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        FileTokenStore::new(&path).save(&sample()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    /// Validates that saving replaces the whole record and leaves no temp
    /// files behind.
    #[tokio::test]
    async fn test_save_overwrites_atomically() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));

        store.save(&sample()).await.unwrap();
        store.save(&OAuthToken::bearer("second")).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "second");
        assert_eq!(loaded.refresh_token, None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = FileTokenStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, TokenStoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));
        store.clear().await.unwrap();
        store.save(&sample()).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load().await.unwrap(), None);
        store.save(&sample()).await.unwrap();
        assert_eq!(store.snapshot(), Some(sample()));
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
