//! OAuth login orchestration
//!
//! Ties discovery, PKCE, the token endpoint client and the token manager
//! together into a two-step browser login:
//! 1. [`OAuthService::start_login`] returns the authorization URL to open
//! 2. [`OAuthService::complete_login`] takes the callback `code` and `state`

use std::sync::Arc;

use basecamp_domain::OAuthSettings;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{info, warn};

use super::client::{build_authorization_url, OAuthClient, OAuthClientConfig, OAuthClientError};
use super::discovery::{Discoverer, DiscoveryError};
use super::pkce::{validate_state, PkceChallenge};
use super::token_manager::{TokenManager, TokenManagerError};
use super::traits::{OAuthClientTrait, TokenStore};
use super::types::{OAuthServerConfig, OAuthToken};

/// Error type for OAuth service operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuthServiceError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Client(#[from] OAuthClientError),

    #[error(transparent)]
    TokenManager(#[from] TokenManagerError),

    /// `complete_login` without a preceding `start_login`
    #[error("no login in progress")]
    NoPendingLogin,
}

/// What the caller shows the user to begin a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub authorization_url: String,
    pub state: String,
}

#[derive(Debug)]
struct PendingLogin {
    state: String,
    code_verifier: Option<String>,
}

/// Browser login plus token lifecycle
pub struct OAuthService<C: OAuthClientTrait + 'static, S: TokenStore + 'static> {
    manager: TokenManager<C, S>,
    pending: Arc<Mutex<Option<PendingLogin>>>,
}

impl<C: OAuthClientTrait + 'static, S: TokenStore + 'static> Clone for OAuthService<C, S> {
    fn clone(&self) -> Self {
        Self { manager: self.manager.clone(), pending: Arc::clone(&self.pending) }
    }
}

impl<S: TokenStore + 'static> OAuthService<OAuthClient, S> {
    /// Discover the authorization server named in `settings` and build a
    /// service around it
    ///
    /// # Errors
    /// Discovery failures and incomplete client settings
    pub async fn discover(settings: &OAuthSettings, store: Arc<S>) -> Result<Self, OAuthServiceError> {
        let server = Discoverer::default().discover(&settings.issuer_url).await?;
        let client = OAuthClient::new(OAuthClientConfig::from_settings(settings)?)?;
        Ok(Self::new(server, client, store, settings.refresh_buffer()))
    }
}

impl<C: OAuthClientTrait + 'static, S: TokenStore + 'static> OAuthService<C, S> {
    #[must_use]
    pub fn new(server: OAuthServerConfig, client: C, store: Arc<S>, refresh_buffer: Duration) -> Self {
        Self {
            manager: TokenManager::new(client, store, server, refresh_buffer),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Begin a login: generate state (and PKCE when enabled) and build the
    /// authorization URL
    ///
    /// Starting again replaces any login still pending.
    ///
    /// # Errors
    /// `InsecureEndpoint` for a non-HTTPS authorization endpoint
    pub fn start_login(&self) -> Result<LoginRequest, OAuthServiceError> {
        let config = self.manager.client().config();
        let pkce = PkceChallenge::generate();
        let challenge = config.use_pkce.then_some(pkce.code_challenge.as_str());

        let authorization_url =
            build_authorization_url(self.manager.server(), config, &pkce.state, challenge)?;

        *self.pending.lock() = Some(PendingLogin {
            state: pkce.state.clone(),
            code_verifier: config.use_pkce.then(|| pkce.code_verifier.clone()),
        });
        info!(pkce = config.use_pkce, "Started OAuth login");

        Ok(LoginRequest { authorization_url, state: pkce.state })
    }

    /// Finish a login with the callback parameters
    ///
    /// The pending login is consumed whether or not the state matches.
    ///
    /// # Errors
    /// - `NoPendingLogin` without a prior `start_login`
    /// - `StateMismatch` when `state` differs from the issued one
    /// - exchange and store failures
    pub async fn complete_login(&self, code: &str, state: &str) -> Result<OAuthToken, OAuthServiceError> {
        let pending = self.pending.lock().take().ok_or(OAuthServiceError::NoPendingLogin)?;
        if !validate_state(&pending.state, state) {
            warn!("OAuth callback state mismatch");
            return Err(OAuthClientError::StateMismatch.into());
        }

        let token = self
            .manager
            .client()
            .exchange_code(self.manager.server(), code, pending.code_verifier.as_deref())
            .await?;
        self.manager.store_tokens(token.clone()).await?;
        info!("OAuth login completed");
        Ok(token)
    }

    /// Forget the stored token
    ///
    /// # Errors
    /// Store failures
    pub async fn logout(&self) -> Result<(), OAuthServiceError> {
        Ok(self.manager.clear_tokens().await?)
    }

    /// Token manager, usable as a `TokenProvider` for the request pipeline
    #[must_use]
    pub const fn token_manager(&self) -> &TokenManager<C, S> {
        &self.manager
    }
}
