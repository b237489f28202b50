//! Token manager with single-flight refresh
//!
//! Manages the OAuth token lifecycle:
//! - Lazy load from the token store on first use
//! - Refresh before expiry (buffer clamped to 60..=120 s)
//! - At most one refresh in flight; concurrent callers await the same one
//! - Optional background refresh task

use std::sync::Arc;

use async_trait::async_trait;
use basecamp_domain::constants::{MAX_REFRESH_BUFFER, MIN_REFRESH_BUFFER};
use basecamp_domain::BasecampError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use super::client::OAuthClientError;
use super::token_store::TokenStoreError;
use super::traits::{OAuthClientTrait, TokenProvider, TokenStore};
use super::types::{OAuthServerConfig, OAuthToken};

/// Error type for token manager operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenManagerError {
    /// No token loaded or stored
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("access token expired and no refresh token is available")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    Refresh(#[from] OAuthClientError),

    #[error(transparent)]
    Store(#[from] TokenStoreError),
}

impl From<TokenManagerError> for BasecampError {
    fn from(err: TokenManagerError) -> Self {
        match err {
            TokenManagerError::Refresh(OAuthClientError::Request(msg)) => Self::Network(msg),
            TokenManagerError::Refresh(OAuthClientError::InsecureEndpoint(msg)) => Self::Usage(msg),
            other => Self::Auth(other.to_string()),
        }
    }
}

type RefreshSlot = Arc<Mutex<Option<Shared<BoxFuture<'static, Result<OAuthToken, TokenManagerError>>>>>>;

/// Clamp a configured refresh buffer into the accepted range
#[must_use]
pub fn clamp_refresh_buffer(buffer: Duration) -> Duration {
    let clamped = buffer.clamp(MIN_REFRESH_BUFFER, MAX_REFRESH_BUFFER);
    if clamped != buffer {
        warn!(
            requested_secs = buffer.as_secs(),
            applied_secs = clamped.as_secs(),
            "Refresh buffer outside accepted range; clamped"
        );
    }
    clamped
}

/// OAuth token lifecycle owner
///
/// Cloning is cheap; clones share the same token, store and refresh slot.
pub struct TokenManager<C: OAuthClientTrait + 'static, S: TokenStore + 'static> {
    client: Arc<C>,
    store: Arc<S>,
    server: Arc<OAuthServerConfig>,
    current: Arc<RwLock<Option<OAuthToken>>>,
    loaded: Arc<OnceCell<()>>,
    in_flight: RefreshSlot,
    refresh_buffer: Duration,
}

impl<C: OAuthClientTrait + 'static, S: TokenStore + 'static> Clone for TokenManager<C, S> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
            server: Arc::clone(&self.server),
            current: Arc::clone(&self.current),
            loaded: Arc::clone(&self.loaded),
            in_flight: Arc::clone(&self.in_flight),
            refresh_buffer: self.refresh_buffer,
        }
    }
}

impl<C: OAuthClientTrait + 'static, S: TokenStore + 'static> TokenManager<C, S> {
    /// Create a token manager
    ///
    /// # Arguments
    /// * `client` - token endpoint client used for refresh
    /// * `store` - persistence backend
    /// * `server` - discovered authorization server metadata
    /// * `refresh_buffer` - refresh this long before expiry; clamped to
    ///   60..=120 seconds
    #[must_use]
    pub fn new(client: C, store: Arc<S>, server: OAuthServerConfig, refresh_buffer: Duration) -> Self {
        Self {
            client: Arc::new(client),
            store,
            server: Arc::new(server),
            current: Arc::new(RwLock::new(None)),
            loaded: Arc::new(OnceCell::new()),
            in_flight: Arc::new(Mutex::new(None)),
            refresh_buffer: clamp_refresh_buffer(refresh_buffer),
        }
    }

    /// Load the persisted token into memory
    ///
    /// Runs at most once; later calls are no-ops. Returns whether a token is
    /// available.
    ///
    /// # Errors
    /// Returns error if the store fails (not if it is empty)
    pub async fn initialize(&self) -> Result<bool, TokenManagerError> {
        self.ensure_loaded().await?;
        Ok(self.is_authenticated().await)
    }

    async fn ensure_loaded(&self) -> Result<(), TokenManagerError> {
        self.loaded
            .get_or_try_init(|| async {
                let token = self.store.load().await?;
                if token.is_some() {
                    info!("Token manager initialized with stored token");
                } else {
                    debug!("No stored token found");
                }
                *self.current.write().await = token;
                Ok::<_, TokenManagerError>(())
            })
            .await?;
        Ok(())
    }

    /// Persist and adopt a new token (after a completed login)
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn store_tokens(&self, token: OAuthToken) -> Result<(), TokenManagerError> {
        self.store.save(&token).await?;
        // A later lazy load must not clobber this token with the old one.
        let _ = self.loaded.set(());
        *self.current.write().await = Some(token);
        info!("Tokens stored successfully");
        Ok(())
    }

    /// Current access token, refreshing first when it is within the buffer
    /// of expiry
    ///
    /// # Errors
    /// - [`TokenManagerError::NotAuthenticated`] when no token is known
    /// - [`TokenManagerError::NoRefreshToken`] when expired and unrefreshable
    /// - refresh or store failures
    pub async fn get_access_token(&self) -> Result<String, TokenManagerError> {
        self.ensure_loaded().await?;

        let token = self.current.read().await.clone().ok_or(TokenManagerError::NotAuthenticated)?;
        if !token.is_expired(self.refresh_buffer) {
            return Ok(token.access_token);
        }
        if token.refresh_token.is_none() {
            return Err(TokenManagerError::NoRefreshToken);
        }

        debug!(
            seconds_until_expiry = ?token.seconds_until_expiry(),
            "Access token within refresh buffer; refreshing"
        );
        Ok(self.refresh_replacing(Some(token.access_token)).await?.access_token)
    }

    /// Refresh the access token
    ///
    /// Joins the in-flight refresh when there is one, so concurrent callers
    /// trigger exactly one token endpoint request.
    ///
    /// # Errors
    /// Returns error if no refresh token is known, the endpoint rejects it,
    /// or persisting the result fails
    pub async fn refresh_tokens(&self) -> Result<OAuthToken, TokenManagerError> {
        self.refresh_replacing(None).await
    }

    /// Refresh unless `stale` has already been replaced in memory
    ///
    /// A caller that read `stale` just before another refresh finished gets
    /// the newer token instead of starting a second refresh.
    async fn refresh_replacing(&self, stale: Option<String>) -> Result<OAuthToken, TokenManagerError> {
        self.ensure_loaded().await?;

        let shared = {
            let mut slot = self.in_flight.lock();
            if let Some(existing) = slot.as_ref() {
                debug!("Joining in-flight token refresh");
                existing.clone()
            } else {
                let fut = self.refresh_future(stale).boxed().shared();
                *slot = Some(fut.clone());
                fut
            }
        };
        shared.await
    }

    fn refresh_future(
        &self,
        stale: Option<String>,
    ) -> impl std::future::Future<Output = Result<OAuthToken, TokenManagerError>> + Send + 'static {
        let client = Arc::clone(&self.client);
        let store = Arc::clone(&self.store);
        let server = Arc::clone(&self.server);
        let current = Arc::clone(&self.current);
        let slot = Arc::clone(&self.in_flight);

        async move {
            let result = async {
                let prior = current.read().await.clone().ok_or(TokenManagerError::NotAuthenticated)?;
                if stale.as_deref().is_some_and(|stale| stale != prior.access_token) {
                    debug!("Token already replaced; skipping refresh");
                    return Ok(prior);
                }
                let refresh_token = prior.refresh_token.ok_or(TokenManagerError::NoRefreshToken)?;

                let refreshed = client
                    .refresh_token(&server, &refresh_token)
                    .await?
                    .merge_refresh_token(Some(&refresh_token));

                // Memory only moves once the store holds the same token.
                store.save(&refreshed).await?;
                *current.write().await = Some(refreshed.clone());
                Ok(refreshed)
            }
            .await;

            *slot.lock() = None;
            match &result {
                Ok(_) => info!("Successfully refreshed access token"),
                Err(e) => error!(error = %e, "Token refresh failed"),
            }
            result
        }
    }

    /// Forget the token in memory and in the store (logout)
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn clear_tokens(&self) -> Result<(), TokenManagerError> {
        self.store.clear().await?;
        let _ = self.loaded.set(());
        *self.current.write().await = None;
        info!("Tokens cleared (logged out)");
        Ok(())
    }

    /// Current token without refreshing
    pub async fn get_tokens(&self) -> Option<OAuthToken> {
        self.current.read().await.clone()
    }

    #[must_use]
    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Seconds until the current token expires, if known
    pub async fn seconds_until_expiry(&self) -> Option<i64> {
        self.current.read().await.as_ref().and_then(OAuthToken::seconds_until_expiry)
    }

    #[must_use]
    pub const fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    /// Token endpoint client shared with login orchestration
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    #[must_use]
    pub fn server(&self) -> &OAuthServerConfig {
        &self.server
    }

    /// Background refresh loop
    ///
    /// Sleeps until the token enters the refresh buffer, then refreshes.
    /// Runs until the task is dropped.
    pub async fn start_auto_refresh(self) {
        info!("Starting token auto-refresh background task");

        loop {
            let wake = match self.seconds_until_expiry().await {
                Some(secs) => {
                    let until_refresh = secs - i64::try_from(self.refresh_buffer.as_secs()).unwrap_or(i64::MAX);
                    Duration::from_secs(u64::try_from(until_refresh).unwrap_or(0))
                }
                None => Duration::from_secs(60),
            };

            if !wake.is_zero() {
                debug!(sleep_secs = wake.as_secs(), "Auto-refresh sleeping");
                tokio::time::sleep(wake).await;
            }

            let needs_refresh = self
                .current
                .read()
                .await
                .as_ref()
                .is_some_and(|t| t.refresh_token.is_some() && t.is_expired(self.refresh_buffer));

            if needs_refresh {
                if let Err(e) = self.refresh_tokens().await {
                    error!(error = %e, "Auto-refresh failed; retrying in 60 seconds");
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            } else if wake.is_zero() {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        }
    }
}

#[async_trait]
impl<C: OAuthClientTrait + 'static, S: TokenStore + 'static> TokenProvider for TokenManager<C, S> {
    async fn access_token(&self) -> Result<String, BasecampError> {
        Ok(self.get_access_token().await?)
    }

    async fn refresh_after_rejection(&self, rejected: &str) -> bool {
        if self.ensure_loaded().await.is_err() {
            return false;
        }
        let (current, refreshable) = match self.current.read().await.as_ref() {
            Some(t) => (t.access_token.clone(), t.refresh_token.is_some()),
            None => return false,
        };
        if current != rejected {
            debug!("Rejected token already replaced");
            return true;
        }
        if !refreshable {
            return false;
        }
        warn!("Access token rejected by server; refreshing");
        self.refresh_replacing(Some(current)).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::token_manager.
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use super::*;
    use crate::auth::client::OAuthClientConfig;
    use crate::auth::token_store::MemoryTokenStore;

    struct CountingClient {
        config: OAuthClientConfig,
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingClient {
        fn new() -> Self {
            Self {
                config: OAuthClientConfig::new("client", "https://app.example.com/callback"),
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Duration::from_millis(50),
            }
        }
    }

    #[async_trait]
    impl OAuthClientTrait for CountingClient {
        fn config(&self) -> &OAuthClientConfig {
            &self.config
        }

        async fn exchange_code(
            &self,
            _server: &OAuthServerConfig,
            _code: &str,
            _verifier: Option<&str>,
        ) -> Result<OAuthToken, OAuthClientError> {
            Ok(OAuthToken::bearer("exchanged"))
        }

        async fn refresh_token(
            &self,
            _server: &OAuthServerConfig,
            _refresh_token: &str,
        ) -> Result<OAuthToken, OAuthClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(OAuthClientError::OAuth {
                    error: "invalid_grant".into(),
                    description: None,
                });
            }
            // Refresh responses omit the refresh token.
            Ok(OAuthToken {
                expires_at: Some(Utc::now() + chrono::Duration::hours(2)),
                ..OAuthToken::bearer(format!("refreshed-{n}"))
            })
        }
    }

    fn server() -> OAuthServerConfig {
        OAuthServerConfig {
            issuer: "https://launchpad.example.com".into(),
            authorization_endpoint: "https://launchpad.example.com/authorization/new".into(),
            token_endpoint: "https://launchpad.example.com/authorization/token".into(),
            registration_endpoint: None,
            scopes_supported: Vec::new(),
        }
    }

    fn expired_token() -> OAuthToken {
        OAuthToken {
            refresh_token: Some("refresh-1".into()),
            expires_at: Some(Utc::now() - chrono::Duration::minutes(5)),
            ..OAuthToken::bearer("stale")
        }
    }

    fn manager_with(
        client: CountingClient,
        token: Option<OAuthToken>,
    ) -> (TokenManager<CountingClient, MemoryTokenStore>, Arc<MemoryTokenStore>) {
        let store = Arc::new(token.map_or_else(MemoryTokenStore::new, MemoryTokenStore::with_token));
        let manager = TokenManager::new(client, Arc::clone(&store), server(), Duration::from_secs(60));
        (manager, store)
    }

    /// Validates the unauthenticated manager scenario.
    ///
    /// Assertions:
    /// - `initialize` reports no token.
    /// - `get_access_token` fails with `NotAuthenticated`.
    #[tokio::test]
    async fn test_not_authenticated_error() {
        let (manager, _) = manager_with(CountingClient::new(), None);
        assert!(!manager.initialize().await.unwrap());
        assert_eq!(manager.get_access_token().await, Err(TokenManagerError::NotAuthenticated));
    }

    /// Validates that a valid stored token is returned without refresh.
    #[tokio::test]
    async fn test_valid_token_is_used_as_is() {
        let token = OAuthToken {
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..OAuthToken::bearer("fresh")
        };
        let (manager, _) = manager_with(CountingClient::new(), Some(token));
        assert_eq!(manager.get_access_token().await.unwrap(), "fresh");
        assert_eq!(manager.client.calls.load(Ordering::SeqCst), 0);
    }

    /// Validates single-flight refresh under concurrency.
    ///
    /// Assertions:
    /// - Ten concurrent callers cause exactly one refresh request.
    /// - Every caller observes the same new access token.
    /// - The persisted token keeps the prior refresh token.
    /// - The in-flight slot is released afterwards.
    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let (manager, store) = manager_with(CountingClient::new(), Some(expired_token()));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_access_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "refreshed-1");
        }

        assert_eq!(manager.client.calls.load(Ordering::SeqCst), 1);
        let persisted = store.snapshot().unwrap();
        assert_eq!(persisted.access_token, "refreshed-1");
        assert_eq!(persisted.refresh_token.as_deref(), Some("refresh-1"));
        assert!(manager.in_flight.lock().is_none());
    }

    /// Validates that a failed refresh releases the slot so a later call
    /// retries.
    #[tokio::test]
    async fn test_failed_refresh_releases_slot() {
        let client = CountingClient { fail: true, ..CountingClient::new() };
        let (manager, _) = manager_with(client, Some(expired_token()));

        assert!(matches!(manager.get_access_token().await, Err(TokenManagerError::Refresh(_))));
        assert!(manager.in_flight.lock().is_none());
        assert!(manager.get_access_token().await.is_err());
        assert_eq!(manager.client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_refresh_token_error() {
        let token = OAuthToken { refresh_token: None, ..expired_token() };
        let (manager, _) = manager_with(CountingClient::new(), Some(token));
        assert_eq!(manager.get_access_token().await, Err(TokenManagerError::NoRefreshToken));
    }

    /// Validates store/clear round trip through the manager.
    ///
    /// Assertions:
    /// - Stored tokens are visible and persisted.
    /// - Clearing removes both.
    #[tokio::test]
    async fn test_store_and_clear_tokens() {
        let (manager, store) = manager_with(CountingClient::new(), Some(expired_token()));

        manager.store_tokens(OAuthToken::bearer("login")).await.unwrap();
        assert_eq!(manager.get_access_token().await.unwrap(), "login");
        assert_eq!(store.snapshot().unwrap().access_token, "login");

        manager.clear_tokens().await.unwrap();
        assert!(!manager.is_authenticated().await);
        assert!(store.snapshot().is_none());
    }

    /// Validates the post-401 replay decision.
    ///
    /// Assertions:
    /// - A token other than the rejected one means replay without refresh.
    /// - Rejecting the current token triggers one refresh.
    #[tokio::test]
    async fn test_refresh_after_rejection() {
        let token = OAuthToken {
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..expired_token()
        };
        let (manager, _) = manager_with(CountingClient::new(), Some(token));

        assert!(manager.refresh_after_rejection("older").await);
        assert_eq!(manager.client.calls.load(Ordering::SeqCst), 0);

        assert!(manager.refresh_after_rejection("stale").await);
        assert_eq!(manager.client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.access_token().await.unwrap(), "refreshed-1");
    }

    struct FailingSaveStore {
        token: parking_lot::Mutex<Option<OAuthToken>>,
    }

    #[async_trait]
    impl TokenStore for FailingSaveStore {
        async fn load(&self) -> Result<Option<OAuthToken>, TokenStoreError> {
            Ok(self.token.lock().clone())
        }

        async fn save(&self, _token: &OAuthToken) -> Result<(), TokenStoreError> {
            Err(TokenStoreError::Io("disk full".into()))
        }

        async fn clear(&self) -> Result<(), TokenStoreError> {
            *self.token.lock() = None;
            Ok(())
        }
    }

    /// Validates the refresh-then-persist-failure scenario.
    ///
    /// Assertions:
    /// - The caller sees the store error.
    /// - Memory still holds the token the store holds.
    /// - The slot is released.
    #[tokio::test]
    async fn test_failed_persist_keeps_memory_in_sync_with_store() {
        let store = Arc::new(FailingSaveStore { token: parking_lot::Mutex::new(Some(expired_token())) });
        let manager = TokenManager::new(CountingClient::new(), store, server(), Duration::from_secs(60));

        assert!(matches!(manager.get_access_token().await, Err(TokenManagerError::Store(_))));
        assert_eq!(manager.client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.get_tokens().await.unwrap().access_token, "stale");
        assert!(manager.in_flight.lock().is_none());
    }

    /// Validates a late caller holding a token that was already refreshed.
    ///
    /// Assertions:
    /// - Refreshing with the replaced token returns the current one.
    /// - No second token endpoint request is made.
    #[tokio::test]
    async fn test_refresh_skipped_when_token_already_replaced() {
        let (manager, _) = manager_with(CountingClient::new(), Some(expired_token()));

        assert_eq!(manager.get_access_token().await.unwrap(), "refreshed-1");
        let late = manager.refresh_replacing(Some("stale".into())).await.unwrap();

        assert_eq!(late.access_token, "refreshed-1");
        assert_eq!(manager.client.calls.load(Ordering::SeqCst), 1);

        manager.refresh_tokens().await.unwrap();
        assert_eq!(manager.client.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_refresh_buffer_is_clamped() {
        assert_eq!(clamp_refresh_buffer(Duration::from_secs(5)), Duration::from_secs(60));
        assert_eq!(clamp_refresh_buffer(Duration::from_secs(90)), Duration::from_secs(90));
        assert_eq!(clamp_refresh_buffer(Duration::from_secs(600)), Duration::from_secs(120));
    }

    #[test]
    fn test_error_mapping() {
        let err: BasecampError =
            TokenManagerError::Refresh(OAuthClientError::Request("timeout".into())).into();
        assert!(matches!(err, BasecampError::Network(_)));
        let err: BasecampError = TokenManagerError::NotAuthenticated.into();
        assert!(matches!(err, BasecampError::Auth(_)));
    }
}
