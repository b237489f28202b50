//! OAuth data types
//!
//! `OAuthToken` is also the persisted token-file format, so its serde names
//! are camelCase (`accessToken`, `expiresAt`, ...). Token endpoint
//! responses use the snake_case wire names and go through
//! [`TokenResponse`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authorization server metadata returned by discovery
///
/// Populated once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthServerConfig {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
}

/// An OAuth access token plus its refresh metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// Bearer token without expiry metadata
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_in: None,
            expires_at: None,
            scope: None,
        }
    }

    /// `true` when `now + buffer >= expires_at`
    ///
    /// A token without an expiry never expires.
    #[must_use]
    pub fn is_expired(&self, buffer: Duration) -> bool {
        self.is_expired_at(Utc::now(), buffer)
    }

    /// [`Self::is_expired`] against an explicit clock
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let buffer =
            chrono::Duration::from_std(buffer).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        now.checked_add_signed(buffer).map_or(true, |deadline| deadline >= expires_at)
    }

    /// Seconds left before expiry; negative once expired
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|at| (at - Utc::now()).num_seconds())
    }

    /// Keep `prior` as the refresh token when this token arrived without one
    ///
    /// Refresh responses commonly omit the refresh token; dropping the known
    /// one would make the next refresh impossible.
    #[must_use]
    pub fn merge_refresh_token(mut self, prior: Option<&str>) -> Self {
        if self.refresh_token.as_deref().map_or(true, str::is_empty) {
            self.refresh_token = prior.map(str::to_string);
        }
        self
    }
}

/// Token endpoint success body
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into a token, computing `expires_at` relative to `now`
    ///
    /// A lifetime too large to represent leaves `expires_at` unset.
    #[must_use]
    pub fn into_token(self, now: DateTime<Utc>) -> OAuthToken {
        let expires_in = self.expires_in.filter(|secs| *secs > 0);
        OAuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            token_type: self.token_type.filter(|t| !t.is_empty()).unwrap_or_else(default_token_type),
            expires_in,
            expires_at: expires_in
                .and_then(chrono::Duration::try_seconds)
                .and_then(|lifetime| now.checked_add_signed(lifetime)),
            scope: self.scope.filter(|s| !s.is_empty()),
        }
    }
}

impl From<TokenResponse> for OAuthToken {
    fn from(response: TokenResponse) -> Self {
        response.into_token(Utc::now())
    }
}

/// Token endpoint error body (RFC 6749 section 5.2)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}
