//! Fixed-token provider

use async_trait::async_trait;
use basecamp_domain::{BasecampError, Result};

use super::traits::TokenProvider;

/// Provider for a pre-issued token, e.g. from `BASECAMP_TOKEN`
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Provider for `BASECAMP_TOKEN`, if set and non-empty
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var("BASECAMP_TOKEN").ok().filter(|t| !t.is_empty()).map(Self::new)
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider").field("token", &"[REDACTED]").finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(BasecampError::Auth("no access token configured".into()));
        }
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_configured_token_and_never_refreshes() {
        let provider = StaticTokenProvider::new("tok");
        assert_eq!(provider.access_token().await.unwrap(), "tok");
        assert!(!provider.refresh_after_rejection("tok").await);
        assert!(!format!("{provider:?}").contains("tok\""));
    }

    #[tokio::test]
    async fn empty_token_is_auth_error() {
        let err = StaticTokenProvider::new("").access_token().await.unwrap_err();
        assert!(matches!(err, BasecampError::Auth(_)));
    }
}
