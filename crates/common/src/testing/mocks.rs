//! Mock implementations of the auth traits

// Mocks keep failure handling minimal.
#![allow(clippy::missing_errors_doc)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{OAuthClientConfig, OAuthClientError, OAuthClientTrait, OAuthServerConfig, OAuthToken};

/// Scripted token endpoint
///
/// Refresh responses are queued; once the queue is empty every refresh
/// returns `refreshed-<n>` with a one hour lifetime and no refresh token.
#[derive(Debug, Clone)]
pub struct MockOAuthClient {
    config: OAuthClientConfig,
    refresh_calls: Arc<AtomicUsize>,
    exchange_calls: Arc<AtomicUsize>,
    refresh_responses: Arc<Mutex<Vec<Result<OAuthToken, OAuthClientError>>>>,
    refresh_tokens_seen: Arc<Mutex<Vec<String>>>,
    latency: Duration,
}

impl MockOAuthClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: OAuthClientConfig::new("mock-client", "http://localhost:8765/callback"),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            exchange_calls: Arc::new(AtomicUsize::new(0)),
            refresh_responses: Arc::new(Mutex::new(Vec::new())),
            refresh_tokens_seen: Arc::new(Mutex::new(Vec::new())),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call, to widen race windows in concurrency tests
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue the result of the next refresh
    pub fn push_refresh_response(&self, response: Result<OAuthToken, OAuthClientError>) {
        self.refresh_responses.lock().push(response);
    }

    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn exchange_count(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented so far, in call order
    #[must_use]
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().clone()
    }
}

impl Default for MockOAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OAuthClientTrait for MockOAuthClient {
    fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn exchange_code(
        &self,
        _server: &OAuthServerConfig,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<OAuthToken, OAuthClientError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        Ok(OAuthToken {
            refresh_token: Some(format!("refresh-for-{code}")),
            ..OAuthToken::bearer(format!("access-for-{code}"))
        })
    }

    async fn refresh_token(
        &self,
        _server: &OAuthServerConfig,
        refresh_token: &str,
    ) -> Result<OAuthToken, OAuthClientError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_tokens_seen.lock().push(refresh_token.to_string());
        tokio::time::sleep(self.latency).await;

        let scripted = {
            let mut queue = self.refresh_responses.lock();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        };
        scripted.unwrap_or_else(|| {
            Ok(OAuthToken {
                expires_in: Some(3600),
                expires_at: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
                ..OAuthToken::bearer(format!("refreshed-{n}"))
            })
        })
    }
}
