//! OAuth 2.0 token endpoint client
//!
//! Handles the three HTTP-facing steps of the authorization code flow:
//! - Authorization URL building (with optional PKCE)
//! - Authorization code exchange
//! - Token refresh
//!
//! Two request formats are supported. The standard one sends
//! `grant_type=authorization_code|refresh_token`; the legacy Launchpad one
//! sends `type=web_server|refresh` instead.

use std::time::Duration;

use async_trait::async_trait;
use basecamp_domain::constants::{MAX_ERROR_MESSAGE_BYTES, MAX_TOKEN_RESPONSE_BYTES};
use basecamp_domain::OAuthSettings;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use super::traits::OAuthClientTrait;
use super::types::{OAuthServerConfig, OAuthToken, TokenErrorResponse, TokenResponse};
use crate::body::{read_limited, BodyError};
use crate::error::{truncate_message, ErrorClassification, ErrorSeverity};
use crate::security::require_secure_endpoint;

/// Error type for OAuth client operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuthClientError {
    /// Endpoint is neither HTTPS nor local
    #[error("insecure endpoint: {0}")]
    InsecureEndpoint(String),

    /// Required parameter missing
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport failure talking to the token endpoint
    #[error("token request failed: {0}")]
    Request(String),

    #[error("token response body exceeds {limit} byte limit")]
    ResponseTooLarge { limit: usize },

    /// RFC 6749 error body
    #[error("token error: {error}{}", describe(.description))]
    OAuth { error: String, description: Option<String> },

    /// Non-200 response without a recognizable error body
    #[error("token request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse token response: {0}")]
    Parse(String),

    /// Callback state did not match the pending login
    #[error("state mismatch on authorization callback")]
    StateMismatch,
}

fn describe(description: &Option<String>) -> String {
    description.as_ref().map(|d| format!(" - {d}")).unwrap_or_default()
}

impl From<BodyError> for OAuthClientError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::TooLarge { limit } => Self::ResponseTooLarge { limit },
            BodyError::Read { message, .. } => Self::Request(message),
        }
    }
}

impl ErrorClassification for OAuthClientError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Request(_) | Self::Status { .. } => ErrorSeverity::Warning,
            Self::StateMismatch | Self::InsecureEndpoint(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Client registration and flow options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scope: Option<String>,
    /// Send `type=web_server|refresh` instead of `grant_type`
    pub legacy_format: bool,
    pub use_pkce: bool,
}

impl OAuthClientConfig {
    #[must_use]
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scope: None,
            legacy_format: false,
            use_pkce: true,
        }
    }

    /// Build from loaded settings
    ///
    /// # Errors
    /// `InvalidRequest` when the client id or redirect URI is missing.
    pub fn from_settings(settings: &OAuthSettings) -> Result<Self, OAuthClientError> {
        let client_id = settings
            .client_id
            .clone()
            .ok_or_else(|| OAuthClientError::InvalidRequest("client ID is required".into()))?;
        let redirect_uri = settings
            .redirect_uri
            .clone()
            .ok_or_else(|| OAuthClientError::InvalidRequest("redirect URI is required".into()))?;
        Ok(Self {
            client_id,
            client_secret: settings.client_secret.clone(),
            redirect_uri,
            scope: settings.scope.clone(),
            legacy_format: settings.legacy_format,
            use_pkce: settings.use_pkce,
        })
    }
}

/// Build the browser authorization URL
///
/// Always carries `response_type=code`, `client_id`, `redirect_uri` and
/// `state`; `code_challenge` and `code_challenge_method=S256` are added
/// when a challenge is supplied.
///
/// # Errors
/// `InsecureEndpoint` when the authorization endpoint is not HTTPS (local
/// hosts excepted).
pub fn build_authorization_url(
    server: &OAuthServerConfig,
    config: &OAuthClientConfig,
    state: &str,
    code_challenge: Option<&str>,
) -> Result<String, OAuthClientError> {
    require_secure_endpoint(&server.authorization_endpoint)
        .map_err(|_| OAuthClientError::InsecureEndpoint(server.authorization_endpoint.clone()))?;

    let mut params = vec![
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("state", state),
    ];
    if let Some(scope) = config.scope.as_deref() {
        params.push(("scope", scope));
    }
    if let Some(challenge) = code_challenge {
        params.push(("code_challenge", challenge));
        params.push(("code_challenge_method", "S256"));
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if server.authorization_endpoint.contains('?') { '&' } else { '?' };

    Ok(format!("{}{separator}{query}", server.authorization_endpoint))
}

/// OAuth 2.0 client for the token endpoint
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthClientConfig,
    http: Client,
}

impl OAuthClient {
    /// Create a client with its own HTTP connection pool (30s timeout)
    ///
    /// # Errors
    /// `Request` when the TLS backend cannot be initialized.
    pub fn new(config: OAuthClientConfig) -> Result<Self, OAuthClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OAuthClientError::Request(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Create a client sharing an existing HTTP connection pool
    #[must_use]
    pub const fn with_http_client(config: OAuthClientConfig, http: Client) -> Self {
        Self { config, http }
    }

    /// Exchange an authorization code for tokens
    ///
    /// # Errors
    /// `InvalidRequest` for a missing code, client id or redirect URI;
    /// otherwise see [`OAuthClientError`].
    pub async fn exchange_code(
        &self,
        server: &OAuthServerConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<OAuthToken, OAuthClientError> {
        if code.is_empty() {
            return Err(OAuthClientError::InvalidRequest("authorization code is required".into()));
        }
        if self.config.redirect_uri.is_empty() {
            return Err(OAuthClientError::InvalidRequest("redirect URI is required".into()));
        }
        if self.config.client_id.is_empty() {
            return Err(OAuthClientError::InvalidRequest("client ID is required".into()));
        }

        let mut form = vec![if self.config.legacy_format {
            ("type", "web_server".to_string())
        } else {
            ("grant_type", "authorization_code".to_string())
        }];
        form.push(("code", code.to_string()));
        form.push(("redirect_uri", self.config.redirect_uri.clone()));
        form.push(("client_id", self.config.client_id.clone()));
        if let Some(secret) = self.config.client_secret.as_deref().filter(|s| !s.is_empty()) {
            form.push(("client_secret", secret.to_string()));
        }
        if let Some(verifier) = code_verifier.filter(|v| !v.is_empty()) {
            form.push(("code_verifier", verifier.to_string()));
        }

        self.token_request(&server.token_endpoint, &form).await
    }

    /// Exchange a refresh token for a new access token
    ///
    /// # Errors
    /// `InvalidRequest` for an empty refresh token; otherwise see
    /// [`OAuthClientError`].
    pub async fn refresh(
        &self,
        server: &OAuthServerConfig,
        refresh_token: &str,
    ) -> Result<OAuthToken, OAuthClientError> {
        if refresh_token.is_empty() {
            return Err(OAuthClientError::InvalidRequest("refresh token is required".into()));
        }

        let mut form = vec![if self.config.legacy_format {
            ("type", "refresh".to_string())
        } else {
            ("grant_type", "refresh_token".to_string())
        }];
        form.push(("refresh_token", refresh_token.to_string()));
        if !self.config.client_id.is_empty() {
            form.push(("client_id", self.config.client_id.clone()));
        }
        if let Some(secret) = self.config.client_secret.as_deref().filter(|s| !s.is_empty()) {
            form.push(("client_secret", secret.to_string()));
        }

        self.token_request(&server.token_endpoint, &form).await
    }

    async fn token_request(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<OAuthToken, OAuthClientError> {
        let url = require_secure_endpoint(endpoint)
            .map_err(|_| OAuthClientError::InsecureEndpoint(endpoint.to_string()))?;

        debug!(endpoint = %url, legacy = self.config.legacy_format, "Requesting OAuth token");

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| OAuthClientError::Request(e.to_string()))?;

        let status = response.status();
        let body = read_limited(response, MAX_TOKEN_RESPONSE_BYTES).await?;

        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Token endpoint returned an error");
            if let Ok(err) = serde_json::from_slice::<TokenErrorResponse>(&body) {
                if !err.error.is_empty() {
                    return Err(OAuthClientError::OAuth {
                        error: err.error,
                        description: err
                            .error_description
                            .filter(|d| !d.is_empty())
                            .map(|d| truncate_message(&d, MAX_ERROR_MESSAGE_BYTES)),
                    });
                }
            }
            return Err(OAuthClientError::Status {
                status: status.as_u16(),
                body: truncate_message(&String::from_utf8_lossy(&body), MAX_ERROR_MESSAGE_BYTES),
            });
        }

        let response: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| OAuthClientError::Parse(e.to_string()))?;
        Ok(response.into_token(Utc::now()))
    }
}

#[async_trait]
impl OAuthClientTrait for OAuthClient {
    fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn exchange_code(
        &self,
        server: &OAuthServerConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<OAuthToken, OAuthClientError> {
        Self::exchange_code(self, server, code, code_verifier).await
    }

    async fn refresh_token(
        &self,
        server: &OAuthServerConfig,
        refresh_token: &str,
    ) -> Result<OAuthToken, OAuthClientError> {
        self.refresh(server, refresh_token).await
    }
}
