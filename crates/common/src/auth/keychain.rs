//! Token storage in the platform keychain
//!
//! The token is stored as one JSON secret under `(service, account)`:
//! - **macOS**: Keychain Services
//! - **Windows**: Credential Manager
//! - **Linux**: Secret Service
//!
//! `keyring` calls block, so every operation runs on the blocking pool.

use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

use super::token_store::TokenStoreError;
use super::traits::TokenStore;
use super::types::OAuthToken;

/// Keychain-backed token store
#[derive(Debug, Clone)]
pub struct KeychainTokenStore {
    service: String,
    account: String,
}

impl KeychainTokenStore {
    /// Store under `service`/`account`, e.g. `("basecamp-sdk",
    /// "https://3.basecampapi.com")`
    #[must_use]
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self { service: service.into(), account: account.into() }
    }

    async fn with_entry<T, F>(&self, op: F) -> Result<T, TokenStoreError>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T, TokenStoreError> + Send + 'static,
    {
        let service = self.service.clone();
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &account).map_err(keychain_error)?;
            op(entry)
        })
        .await
        .map_err(|e| TokenStoreError::Keychain(e.to_string()))?
    }
}

fn keychain_error(err: keyring::Error) -> TokenStoreError {
    TokenStoreError::Keychain(err.to_string())
}

#[async_trait]
impl TokenStore for KeychainTokenStore {
    async fn load(&self) -> Result<Option<OAuthToken>, TokenStoreError> {
        debug!(service = %self.service, account = %self.account, "Loading token from keychain");
        self.with_entry(|entry| match entry.get_password() {
            Ok(secret) => serde_json::from_str(&secret)
                .map(Some)
                .map_err(|e| TokenStoreError::Corrupt(e.to_string())),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(keychain_error(e)),
        })
        .await
    }

    async fn save(&self, token: &OAuthToken) -> Result<(), TokenStoreError> {
        let secret =
            serde_json::to_string(token).map_err(|e| TokenStoreError::Corrupt(e.to_string()))?;
        debug!(service = %self.service, account = %self.account, "Saving token to keychain");
        self.with_entry(move |entry| entry.set_password(&secret).map_err(keychain_error)).await
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        self.with_entry(|entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(keychain_error(e)),
        })
        .await
    }
}
