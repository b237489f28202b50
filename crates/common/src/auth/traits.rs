//! Traits for OAuth and token persistence
//!
//! These traits are the seams the token manager is generic over, so tests
//! can swap in mocks for the token endpoint and the storage backend.

use async_trait::async_trait;
use basecamp_domain::BasecampError;

use super::client::{OAuthClientConfig, OAuthClientError};
use super::token_store::TokenStoreError;
use super::types::{OAuthServerConfig, OAuthToken};

/// Token endpoint operations
#[async_trait]
pub trait OAuthClientTrait: Send + Sync {
    /// Client registration used for authorization URLs
    fn config(&self) -> &OAuthClientConfig;

    /// Exchange an authorization code (plus optional PKCE verifier)
    async fn exchange_code(
        &self,
        server: &OAuthServerConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<OAuthToken, OAuthClientError>;

    /// Exchange a refresh token for a new access token
    async fn refresh_token(
        &self,
        server: &OAuthServerConfig,
        refresh_token: &str,
    ) -> Result<OAuthToken, OAuthClientError>;
}

/// Persistent token storage
///
/// `load` returns `Ok(None)` when nothing has been saved yet; only real
/// I/O or decoding failures are errors.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<OAuthToken>, TokenStoreError>;

    /// Replace the stored token as a whole
    async fn save(&self, token: &OAuthToken) -> Result<(), TokenStoreError>;

    async fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Source of bearer tokens for outgoing requests
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A currently valid access token
    async fn access_token(&self) -> Result<String, BasecampError>;

    /// Called after the API rejected `rejected` with 401
    ///
    /// Returns `true` when a different token is now available and the
    /// request is worth replaying once. Providers that cannot refresh keep
    /// the default.
    async fn refresh_after_rejection(&self, rejected: &str) -> bool {
        let _ = rejected;
        false
    }
}
