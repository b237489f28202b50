//! OAuth authorization server discovery (RFC 8414)

use basecamp_domain::constants::{DISCOVERY_PATH, MAX_ERROR_MESSAGE_BYTES, MAX_TOKEN_RESPONSE_BYTES};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::types::OAuthServerConfig;
use crate::body::{read_limited, BodyError};
use crate::error::{truncate_message, ErrorClassification, ErrorSeverity};
use crate::security::require_secure_endpoint;

/// Discovery failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("insecure discovery endpoint: {0}")]
    InsecureEndpoint(String),

    #[error("discovery request failed: {0}")]
    Request(String),

    #[error("discovery failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid discovery response: {0}")]
    InvalidResponse(String),

    #[error("discovery response missing required field `{0}`")]
    MissingField(&'static str),
}

impl From<BodyError> for DiscoveryError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::TooLarge { .. } => Self::InvalidResponse(err.to_string()),
            BodyError::Read { message, .. } => Self::Request(message),
        }
    }
}

impl ErrorClassification for DiscoveryError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        if self.is_retryable() {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Error
        }
    }
}

/// Wire shape; every field optional so missing ones are reported by name
#[derive(Deserialize)]
struct DiscoveryDocument {
    issuer: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    registration_endpoint: Option<String>,
    #[serde(default)]
    scopes_supported: Vec<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DiscoveryError> {
    value.filter(|v| !v.is_empty()).ok_or(DiscoveryError::MissingField(field))
}

/// Fetches `/.well-known/oauth-authorization-server`
#[derive(Debug, Clone, Default)]
pub struct Discoverer {
    http: Client,
}

impl Discoverer {
    #[must_use]
    pub const fn new(http: Client) -> Self {
        Self { http }
    }

    /// Fetch and validate the server metadata under `base_url`
    ///
    /// # Errors
    /// See [`DiscoveryError`]. A document lacking `issuer`,
    /// `authorization_endpoint` or `token_endpoint` is rejected.
    pub async fn discover(&self, base_url: &str) -> Result<OAuthServerConfig, DiscoveryError> {
        let url = format!("{}{DISCOVERY_PATH}", base_url.trim_end_matches('/'));
        let url = require_secure_endpoint(&url)
            .map_err(|_| DiscoveryError::InsecureEndpoint(base_url.to_string()))?;

        debug!(url = %url, "Fetching OAuth discovery document");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;

        let status = response.status();
        let body = read_limited(response, MAX_TOKEN_RESPONSE_BYTES).await?;
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
                body: truncate_message(&String::from_utf8_lossy(&body), MAX_ERROR_MESSAGE_BYTES),
            });
        }

        let doc: DiscoveryDocument = serde_json::from_slice(&body)
            .map_err(|e| DiscoveryError::InvalidResponse(e.to_string()))?;

        let config = OAuthServerConfig {
            issuer: required(doc.issuer, "issuer")?,
            authorization_endpoint: required(doc.authorization_endpoint, "authorization_endpoint")?,
            token_endpoint: required(doc.token_endpoint, "token_endpoint")?,
            registration_endpoint: doc.registration_endpoint.filter(|e| !e.is_empty()),
            scopes_supported: doc.scopes_supported,
        };

        info!(issuer = %config.issuer, "Discovered OAuth server");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::discovery.
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn serve(body: serde_json::Value, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    /// Validates a complete discovery document.
    ///
    /// Assertions:
    /// - Required endpoints and optional fields are populated.
    /// - A trailing slash on the base URL is tolerated.
    #[tokio::test]
    async fn test_discover_success() {
        let server = serve(
            serde_json::json!({
                "issuer": "https://launchpad.example.com",
                "authorization_endpoint": "https://launchpad.example.com/authorization/new",
                "token_endpoint": "https://launchpad.example.com/authorization/token",
                "scopes_supported": ["read", "write"]
            }),
            200,
        )
        .await;

        let config = Discoverer::default().discover(&format!("{}/", server.uri())).await.unwrap();
        assert_eq!(config.token_endpoint, "https://launchpad.example.com/authorization/token");
        assert_eq!(config.scopes_supported, vec!["read", "write"]);
        assert!(config.registration_endpoint.is_none());
    }

    /// Validates that a missing required field is reported by name.
    #[tokio::test]
    async fn test_discover_missing_field() {
        let server = serve(
            serde_json::json!({
                "issuer": "https://launchpad.example.com",
                "authorization_endpoint": "https://launchpad.example.com/authorization/new"
            }),
            200,
        )
        .await;

        let err = Discoverer::default().discover(&server.uri()).await.unwrap_err();
        assert_eq!(err, DiscoveryError::MissingField("token_endpoint"));
    }

    #[tokio::test]
    async fn test_discover_error_status() {
        let server = serve(serde_json::json!({"error": "nope"}), 404).await;
        let err = Discoverer::default().discover(&server.uri()).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Status { status: 404, .. }));
    }

    /// Validates HTTPS enforcement outside localhost.
    #[tokio::test]
    async fn test_discover_requires_https() {
        let err = Discoverer::default().discover("http://launchpad.example.com").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::InsecureEndpoint(_)));
    }
}
