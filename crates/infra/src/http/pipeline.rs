//! The assembled request pipeline

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use basecamp_common::auth::{StaticTokenProvider, TokenProvider};
use basecamp_common::cache::{CacheStore, FileCacheStore};
use basecamp_common::resilience::{ResilienceConfig, RetryConfig};
use basecamp_common::security::require_secure_endpoint;
use basecamp_domain::constants::{DEFAULT_BASE_URL, DEFAULT_MAX_PAGES, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use basecamp_domain::{BasecampError, ClientConfig, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use super::descriptor::{RequestDescriptor, ResponseDescriptor};
use super::middleware::{
    within_operation, AuthMiddleware, CacheMiddleware, HooksMiddleware, Middleware, Next,
    ResilienceGate, ResilienceMiddleware, RetryMiddleware,
};
use super::transport::{ReqwestTransport, Transport};
use crate::observability::{isolate, Hooks, NoopHooks, OperationInfo, OperationResult};

/// An ordered middleware chain in front of a transport
///
/// Cheap to clone; clones share the transport, the cache and the token
/// provider.
#[derive(Clone)]
pub struct Pipeline {
    middleware: Arc<[Arc<dyn Middleware>]>,
    transport: Arc<dyn Transport>,
    base_url: Url,
    pub(crate) hooks: Arc<dyn Hooks>,
    pub(crate) max_pages: usize,
    resilience: Option<Arc<ResilienceGate>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("base_url", &self.base_url.as_str())
            .field("layers", &self.middleware.len())
            .field("max_pages", &self.max_pages)
            .field("resilience", &self.resilience.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Assemble a pipeline from an explicit layer list, outermost first
    ///
    /// [`PipelineBuilder`] is the usual way in; it fixes the canonical order.
    #[must_use]
    pub fn from_parts(
        middleware: Vec<Arc<dyn Middleware>>,
        transport: Arc<dyn Transport>,
        base_url: Url,
    ) -> Self {
        Self {
            middleware: middleware.into(),
            transport,
            base_url,
            hooks: Arc::new(NoopHooks),
            max_pages: DEFAULT_MAX_PAGES,
            resilience: None,
        }
    }

    /// Shared circuit breakers, bulkheads and rate limiter, when enabled
    #[must_use]
    pub fn resilience(&self) -> Option<&ResilienceGate> {
        self.resilience.as_deref()
    }

    /// Base URL relative request paths resolve against
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Run `request` through every layer without status mapping
    ///
    /// # Errors
    /// Usage, auth and network failures; HTTP error statuses come back as
    /// responses.
    pub async fn execute_raw(&self, request: RequestDescriptor) -> Result<ResponseDescriptor> {
        let request = request.resolve(&self.base_url)?;
        Next::new(&self.middleware, self.transport.as_ref()).run(request).await
    }

    /// Run `request` and map error statuses into [`BasecampError`]
    ///
    /// # Errors
    /// Any [`BasecampError`]; statuses >= 400 map per the error taxonomy.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn execute(&self, request: RequestDescriptor) -> Result<ResponseDescriptor> {
        let response = self.execute_raw(request).await?;
        debug!(status = response.status, from_cache = response.from_cache, "request settled");
        response.error_for_status()
    }

    /// GET `path` and decode the JSON body
    ///
    /// # Errors
    /// See [`Pipeline::execute`]; `Validation` when the body does not decode.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(RequestDescriptor::get(path)).await?.json()
    }

    /// POST `body` as JSON to `path` and decode the JSON response
    ///
    /// # Errors
    /// See [`Pipeline::execute`].
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.execute(RequestDescriptor::post(path).json(body)?).await?.json()
    }

    /// DELETE `path`
    ///
    /// # Errors
    /// See [`Pipeline::execute`].
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(RequestDescriptor::delete(path)).await.map(|_| ())
    }

    /// Run `operation` between `on_operation_start` and `on_operation_end`
    ///
    /// With resilience enabled the whole operation is admitted once under the
    /// scope `service.operation`; the requests it issues are not gated again.
    ///
    /// # Errors
    /// Whatever `operation` returns, or the resilience refusal.
    pub async fn operation<T, F>(&self, info: OperationInfo, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        isolate("on_operation_start", || self.hooks.on_operation_start(&info));
        let started = Instant::now();

        let result = match &self.resilience {
            Some(gate) => match gate.admit(&format!("{}.{}", info.service, info.operation)).await {
                Ok(admission) => {
                    let result = within_operation(operation).await;
                    admission.finish(result.as_ref().err());
                    result
                }
                Err(refused) => Err(refused),
            },
            None => operation.await,
        };

        let outcome = OperationResult { error: result.as_ref().err().cloned(), duration: started.elapsed() };
        isolate("on_operation_end", || self.hooks.on_operation_end(&info, &outcome));
        result
    }
}

/// Builds a [`Pipeline`] in the canonical order
/// (hooks → resilience → cache → retry → auth → transport)
pub struct PipelineBuilder {
    base_url: String,
    account_id: Option<String>,
    hooks: Arc<dyn Hooks>,
    cache: Option<Arc<dyn CacheStore>>,
    retry: RetryConfig,
    resilience: Option<ResilienceConfig>,
    provider: Option<Arc<dyn TokenProvider>>,
    transport: Option<Arc<dyn Transport>>,
    timeout: Duration,
    user_agent: String,
    max_pages: usize,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            account_id: None,
            hooks: Arc::new(NoopHooks),
            cache: None,
            retry: RetryConfig::default(),
            resilience: None,
            provider: None,
            transport: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl PipelineBuilder {
    /// Take base URL, account, timeout, user agent, retry policy, page cap
    /// and the file cache (when enabled) from `config`
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut builder = Self {
            base_url: config.http.base_url.clone(),
            account_id: config.account_id.clone(),
            retry: RetryConfig::from(&config.http),
            timeout: config.http.timeout(),
            user_agent: config.http.user_agent.clone(),
            max_pages: config.http.max_pages,
            ..Self::default()
        };
        if config.cache.enabled {
            if let Some(dir) = config.cache.resolved_dir() {
                builder.cache = Some(Arc::new(FileCacheStore::new(dir)));
            }
        }
        builder
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Account id appended to the base URL path
    #[must_use]
    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    #[must_use]
    pub fn no_retry(mut self) -> Self {
        self.retry = RetryConfig::disabled();
        self
    }

    /// Circuit breaker, bulkhead and client rate limit; off unless set
    #[must_use]
    pub fn resilience(mut self, config: ResilienceConfig) -> Self {
        self.resilience = Some(config);
        self
    }

    /// Fixed bearer token
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.provider = Some(Arc::new(StaticTokenProvider::new(token)));
        self
    }

    /// Token source, e.g. a `TokenManager`
    #[must_use]
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Replace the default `reqwest` transport
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub const fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// # Errors
    /// `Usage` when no token source is set, the base URL is not HTTPS
    /// (localhost excepted), or the retry or resilience policy is invalid.
    pub fn build(self) -> Result<Pipeline> {
        let provider = self
            .provider
            .ok_or_else(|| BasecampError::Usage("no access token or token provider configured".into()))?;
        self.retry.validate().map_err(|e| BasecampError::Usage(e.to_string()))?;

        let root = self.base_url.trim_end_matches('/');
        let base = match self.account_id.as_deref().filter(|a| !a.is_empty()) {
            Some(account) => format!("{root}/{account}/"),
            None => format!("{root}/"),
        };
        let base_url = require_secure_endpoint(&base)?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::builder().timeout(self.timeout).user_agent(self.user_agent).build()?,
            ),
        };

        let resilience = self.resilience.map(ResilienceGate::new).transpose()?.map(Arc::new);

        let mut middleware: Vec<Arc<dyn Middleware>> = vec![Arc::new(HooksMiddleware::new(self.hooks.clone()))];
        if let Some(gate) = &resilience {
            middleware.push(Arc::new(ResilienceMiddleware::new(gate.clone())));
        }
        if let Some(store) = self.cache {
            middleware.push(Arc::new(CacheMiddleware::new(store)));
        }
        middleware.push(Arc::new(RetryMiddleware::new(self.retry, self.hooks.clone())));
        middleware.push(Arc::new(AuthMiddleware::new(provider, self.hooks.clone())));

        debug!(base_url = %base_url, layers = middleware.len(), "Pipeline built");

        Ok(Pipeline {
            middleware: middleware.into(),
            transport,
            base_url,
            hooks: self.hooks,
            max_pages: self.max_pages.max(1),
            resilience,
        })
    }
}

#[cfg(test)]
mod tests {
    use basecamp_common::resilience::{CircuitBreakerConfig, CircuitState};

    use super::*;
    use crate::observability::{HookEvent, RecordingHooks};

    #[test]
    fn build_requires_a_token_source() {
        let err = Pipeline::builder().build().unwrap_err();
        assert!(matches!(err, BasecampError::Usage(_)));
    }

    #[test]
    fn build_rejects_plain_http_for_remote_hosts() {
        let err = Pipeline::builder().base_url("http://3.basecampapi.com").token("t").build().unwrap_err();
        assert!(matches!(err, BasecampError::Usage(_)));

        assert!(Pipeline::builder().base_url("http://127.0.0.1:8080").token("t").build().is_ok());
    }

    #[test]
    fn account_id_is_appended_to_base_url() {
        let pipeline = Pipeline::builder().account_id("999").token("t").build().unwrap();
        assert_eq!(pipeline.base_url().as_str(), "https://3.basecampapi.com/999/");
    }

    #[test]
    fn from_config_carries_http_settings() {
        let mut config = ClientConfig::default();
        config.account_id = Some("42".into());
        config.http.max_pages = 3;
        let pipeline = PipelineBuilder::from_config(&config).token("t").build().unwrap();
        assert_eq!(pipeline.base_url().as_str(), "https://3.basecampapi.com/42/");
        assert_eq!(pipeline.max_pages, 3);
    }

    #[tokio::test]
    async fn operation_reports_start_and_end() {
        let hooks = Arc::new(RecordingHooks::new());
        let pipeline = Pipeline::builder().token("t").hooks(hooks.clone()).build().unwrap();

        let info = OperationInfo::new("projects", "list");
        let result: Result<u32> =
            pipeline.operation(info, async { Err(BasecampError::NotFound("project".into())) }).await;

        assert!(result.is_err());
        let events = hooks.events();
        assert!(matches!(events[0], HookEvent::OperationStart(_)));
        assert!(matches!(&events[1], HookEvent::OperationEnd { error: Some(BasecampError::NotFound(_)), .. }));
    }

    fn breaker_pipeline(hooks: Arc<RecordingHooks>) -> Pipeline {
        let config = ResilienceConfig {
            circuit_breaker: Some(
                CircuitBreakerConfig::builder().failure_threshold(2).open_timeout(Duration::from_secs(60)).build().unwrap(),
            ),
            ..ResilienceConfig::disabled()
        };
        Pipeline::builder().token("t").hooks(hooks).resilience(config).build().unwrap()
    }

    /// Validates operation-level circuit breaking.
    ///
    /// Assertions:
    /// - two server failures open the `todos.list` circuit
    /// - the third call is refused before its body runs, and the end hook
    ///   reports the refusal
    /// - other operations keep their own closed circuit
    #[tokio::test]
    async fn operation_failures_open_its_circuit() {
        let hooks = Arc::new(RecordingHooks::new());
        let pipeline = breaker_pipeline(hooks.clone());
        let server_error = || BasecampError::Api { status: 500, message: "boom".into() };

        for _ in 0..2 {
            let result: Result<()> =
                pipeline.operation(OperationInfo::new("todos", "list"), async { Err(server_error()) }).await;
            assert!(result.is_err());
        }
        let gate = pipeline.resilience().unwrap();
        assert_eq!(gate.circuit_state("todos.list"), Some(CircuitState::Open));

        let ran = std::sync::atomic::AtomicBool::new(false);
        let refused: Result<()> = pipeline
            .operation(OperationInfo::new("todos", "list"), async {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(refused, Err(BasecampError::Network(_))));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
        assert!(matches!(hooks.events().last(), Some(HookEvent::OperationEnd { error: Some(BasecampError::Network(_)), .. })));

        let other: Result<u32> = pipeline.operation(OperationInfo::new("todos", "get"), async { Ok(7) }).await;
        assert_eq!(other.unwrap(), 7);
    }

    #[tokio::test]
    async fn not_found_does_not_count_against_an_operation() {
        let pipeline = breaker_pipeline(Arc::new(RecordingHooks::new()));

        for _ in 0..3 {
            let result: Result<()> = pipeline
                .operation(OperationInfo::new("projects", "get"), async { Err(BasecampError::NotFound("project".into())) })
                .await;
            assert!(matches!(result, Err(BasecampError::NotFound(_))));
        }

        assert_eq!(pipeline.resilience().unwrap().circuit_state("projects.get"), Some(CircuitState::Closed));
    }

    #[test]
    fn resilience_is_off_by_default() {
        let pipeline = Pipeline::builder().token("t").build().unwrap();
        assert!(pipeline.resilience().is_none());
        assert_eq!(pipeline.middleware.len(), 3);

        let pipeline = Pipeline::builder().token("t").resilience(ResilienceConfig::default()).build().unwrap();
        assert_eq!(pipeline.middleware.len(), 4);
    }
}
