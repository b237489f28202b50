//! OAuth 2.0 session management
//!
//! ```text
//! ┌─────────────────┐
//! │  OAuthService   │  start_login / complete_login
//! └────────┬────────┘
//!          │
//!          ├──► Discoverer        (/.well-known/oauth-authorization-server)
//!          ├──► OAuthClient       (authorize URL, code exchange, refresh)
//!          └──► TokenManager      (single-flight refresh)
//!                    │
//!                    └──► TokenStore  (file, keychain, memory)
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use basecamp_common::auth::{FileTokenStore, OAuthService};
//! use basecamp_domain::OAuthSettings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = OAuthSettings {
//!     client_id: Some("client-id".into()),
//!     redirect_uri: Some("http://localhost:8765/callback".into()),
//!     ..OAuthSettings::default()
//! };
//! let store = Arc::new(FileTokenStore::new("/tmp/basecamp-token.json"));
//! let service = OAuthService::discover(&settings, store).await?;
//!
//! let login = service.start_login()?;
//! // Send the user to login.authorization_url, then receive the callback.
//! service.complete_login("code-from-callback", &login.state).await?;
//!
//! let token = service.token_manager().get_access_token().await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```
//!
//! Access tokens are never logged. State comparison is constant-time.

pub mod client;
pub mod discovery;
mod keychain;
pub mod pkce;
pub mod provider;
pub mod service;
pub mod token_manager;
pub mod token_store;
pub mod traits;
pub mod types;

pub use client::{build_authorization_url, OAuthClient, OAuthClientConfig, OAuthClientError};
pub use discovery::{Discoverer, DiscoveryError};
pub use keychain::KeychainTokenStore;
pub use pkce::{
    generate_code_challenge, generate_code_verifier, generate_state, validate_state, PkceChallenge,
};
pub use provider::StaticTokenProvider;
pub use service::{LoginRequest, OAuthService, OAuthServiceError};
pub use token_manager::{clamp_refresh_buffer, TokenManager, TokenManagerError};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStoreError};
pub use traits::{OAuthClientTrait, TokenProvider, TokenStore};
pub use types::{OAuthServerConfig, OAuthToken, TokenErrorResponse, TokenResponse};
