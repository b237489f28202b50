use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use basecamp_common::auth::TokenProvider;
use basecamp_domain::{BasecampError, Result};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use tracing::info;

use super::{Middleware, Next};
use crate::http::descriptor::{RequestDescriptor, ResponseDescriptor};
use crate::observability::{isolate, Hooks};

/// Sets `Authorization: Bearer <token>` right before the transport
///
/// On a 401 the provider gets one chance to refresh; when it does, the
/// request is replayed once with the new token. The replay is announced as
/// a retry.
pub struct AuthMiddleware {
    provider: Arc<dyn TokenProvider>,
    hooks: Arc<dyn Hooks>,
}

impl AuthMiddleware {
    #[must_use]
    pub fn new(provider: Arc<dyn TokenProvider>, hooks: Arc<dyn Hooks>) -> Self {
        Self { provider, hooks }
    }
}

fn authorize(mut request: RequestDescriptor, token: &str) -> Result<RequestDescriptor> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| BasecampError::Auth("access token is not a valid header value".into()))?;
    value.set_sensitive(true);
    request.headers.insert(AUTHORIZATION, value);
    Ok(request)
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(&self, request: RequestDescriptor, next: Next<'_>) -> Result<ResponseDescriptor> {
        let token = self.provider.access_token().await?;
        let response = next.run(authorize(request.clone(), &token)?).await?;

        if response.status != 401 || !self.provider.refresh_after_rejection(&token).await {
            return Ok(response);
        }

        let replay = request.next_attempt();
        let info = replay.info();
        let error = response.to_error();
        info!(method = %info.method, url = %info.url, "Token refreshed, retrying request");
        isolate("on_retry", || self.hooks.on_retry(&info, replay.attempt, &error, Duration::ZERO));

        let token = self.provider.access_token().await?;
        next.run(authorize(replay, &token)?).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use basecamp_common::auth::StaticTokenProvider;
    use parking_lot::Mutex;

    use super::super::test_support::{response, run, ScriptedTransport};
    use super::*;
    use crate::observability::{NoopHooks, RecordingHooks};

    const URL: &str = "https://3.basecampapi.com/999/projects.json";

    /// Hands out `token-N`, bumping N on every accepted refresh
    #[derive(Default)]
    struct RotatingProvider {
        generation: Mutex<u32>,
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl TokenProvider for RotatingProvider {
        async fn access_token(&self) -> Result<String> {
            Ok(format!("token-{}", *self.generation.lock()))
        }

        async fn refresh_after_rejection(&self, _rejected: &str) -> bool {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            *self.generation.lock() += 1;
            true
        }
    }

    fn bearer(request: &RequestDescriptor) -> String {
        request.headers.get(AUTHORIZATION).unwrap().to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn sets_bearer_header() {
        let transport = ScriptedTransport::new(vec![Ok(response(200, &[], "[]"))]);
        let layer = AuthMiddleware::new(Arc::new(StaticTokenProvider::new("abc")), Arc::new(NoopHooks));

        run(vec![Arc::new(layer)], &transport, RequestDescriptor::get(URL)).await.unwrap();

        let seen = transport.seen.lock();
        assert_eq!(bearer(&seen[0]), "Bearer abc");
        assert!(seen[0].headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    /// Validates the single post-401 replay scenario.
    ///
    /// Assertions:
    /// - a 401 triggers one refresh and one replay with the new token
    /// - the replay is reported as one retry
    /// - a second 401 is returned, not replayed again
    #[tokio::test]
    async fn replays_once_after_refresh() {
        let hooks = Arc::new(RecordingHooks::new());
        let provider = Arc::new(RotatingProvider::default());
        let transport = ScriptedTransport::new(vec![Ok(response(401, &[], "")), Ok(response(401, &[], ""))]);
        let layer = AuthMiddleware::new(provider.clone(), hooks.clone());

        let result = run(vec![Arc::new(layer)], &transport, RequestDescriptor::get(URL)).await.unwrap();

        assert_eq!(result.status, 401);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.retries(), 1);
        let seen = transport.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(bearer(&seen[0]), "Bearer token-0");
        assert_eq!(bearer(&seen[1]), "Bearer token-1");
        assert_eq!(seen[1].attempt, 2);
    }

    #[tokio::test]
    async fn static_token_401_is_not_replayed() {
        let transport = ScriptedTransport::new(vec![Ok(response(401, &[], ""))]);
        let layer = AuthMiddleware::new(Arc::new(StaticTokenProvider::new("abc")), Arc::new(NoopHooks));

        let result = run(vec![Arc::new(layer)], &transport, RequestDescriptor::get(URL)).await.unwrap();
        assert_eq!(result.status, 401);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn provider_failure_stops_before_transport() {
        let transport = ScriptedTransport::default();
        let layer = AuthMiddleware::new(Arc::new(StaticTokenProvider::new("")), Arc::new(NoopHooks));

        let err = run(vec![Arc::new(layer)], &transport, RequestDescriptor::get(URL)).await.unwrap_err();
        assert!(matches!(err, BasecampError::Auth(_)));
        assert_eq!(transport.calls(), 0);
    }
}
