use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use basecamp_common::resilience::{
    Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, CircuitState, ResilienceConfig,
    ResilienceError, TokenBucket,
};
use basecamp_domain::{BasecampError, Result};
use parking_lot::RwLock;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};
use url::Url;

use super::{Middleware, Next};
use crate::http::descriptor::{RequestDescriptor, ResponseDescriptor};

/// Pause applied to the client rate limiter after a 429 without `Retry-After`
const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

tokio::task_local! {
    static OPERATION_ADMITTED: ();
}

/// Circuit breakers and bulkheads per scope, plus one shared rate limiter
///
/// A scope is `service.operation` for calls wrapped in
/// [`Pipeline::operation`](crate::http::Pipeline::operation) and the URL host
/// for bare requests.
#[derive(Debug)]
pub struct ResilienceGate {
    breaker_config: Option<CircuitBreakerConfig>,
    bulkhead_config: Option<BulkheadConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    bulkheads: RwLock<HashMap<String, Arc<Bulkhead>>>,
    limiter: Option<TokenBucket>,
}

impl ResilienceGate {
    /// # Errors
    /// `Usage` when any part of `config` is invalid.
    pub fn new(config: ResilienceConfig) -> Result<Self> {
        config.validate().map_err(|e| BasecampError::Usage(e.to_string()))?;
        let limiter = config
            .rate_limit
            .map(TokenBucket::new)
            .transpose()
            .map_err(|e| BasecampError::Usage(e.to_string()))?;
        Ok(Self {
            breaker_config: config.circuit_breaker,
            bulkhead_config: config.bulkhead,
            breakers: RwLock::default(),
            bulkheads: RwLock::default(),
            limiter,
        })
    }

    /// Check breaker, bulkhead and rate limiter for `scope`, in that order
    ///
    /// A rate limit refusal gives the bulkhead slot back before returning.
    ///
    /// # Errors
    /// `Network` for an open circuit or a full bulkhead, `RateLimit` when the
    /// client-side bucket is empty or paused.
    pub async fn admit(&self, scope: &str) -> Result<Admission> {
        let breaker = self.breaker(scope);
        if let Some(breaker) = &breaker {
            if !breaker.allow() {
                debug!(scope, "Circuit open; call refused");
                return Err(ResilienceError::CircuitOpen { scope: scope.to_string() }.into());
            }
        }

        let permit = match self.bulkhead(scope) {
            Some(bulkhead) => Some(bulkhead.acquire().await.map_err(|e| {
                warn!(scope, capacity = bulkhead.capacity(), "Bulkhead full; call refused");
                BasecampError::from(e)
            })?),
            None => None,
        };

        if let Some(limiter) = &self.limiter {
            if !limiter.allow() {
                let remaining = limiter.retry_after_remaining();
                debug!(scope, "Client rate limit reached; call refused");
                return Err(ResilienceError::RateLimited {
                    retry_after: (!remaining.is_zero()).then_some(remaining),
                }
                .into());
            }
        }

        Ok(Admission { breaker, _permit: permit })
    }

    /// Feed a server response back into the rate limiter
    ///
    /// 429 pauses for `Retry-After` or a minute; 503 only pauses when the
    /// server names a delay.
    pub fn note_response(&self, status: u16, retry_after: Option<Duration>) {
        let Some(limiter) = &self.limiter else { return };
        match (status, retry_after) {
            (429, delay) => limiter.set_retry_after(delay.unwrap_or(DEFAULT_RATE_LIMIT_PAUSE)),
            (503, Some(delay)) => limiter.set_retry_after(delay),
            _ => {}
        }
    }

    /// Current breaker state for `scope`, `None` when breakers are off or the
    /// scope has not been seen
    #[must_use]
    pub fn circuit_state(&self, scope: &str) -> Option<CircuitState> {
        self.breakers.read().get(scope).map(|b| b.state())
    }

    /// Free bulkhead slots for `scope`
    #[must_use]
    pub fn available_slots(&self, scope: &str) -> Option<usize> {
        self.bulkheads.read().get(scope).map(|b| b.available())
    }

    #[must_use]
    pub const fn rate_limiter(&self) -> Option<&TokenBucket> {
        self.limiter.as_ref()
    }

    fn breaker(&self, scope: &str) -> Option<Arc<CircuitBreaker>> {
        let config = self.breaker_config.as_ref()?;
        if let Some(breaker) = self.breakers.read().get(scope) {
            return Some(breaker.clone());
        }
        let mut breakers = self.breakers.write();
        if let Some(breaker) = breakers.get(scope) {
            return Some(breaker.clone());
        }
        // Validated in `new`
        let breaker = Arc::new(CircuitBreaker::new(config.clone()).ok()?);
        breakers.insert(scope.to_string(), breaker.clone());
        Some(breaker)
    }

    fn bulkhead(&self, scope: &str) -> Option<Arc<Bulkhead>> {
        let config = self.bulkhead_config.as_ref()?;
        if let Some(bulkhead) = self.bulkheads.read().get(scope) {
            return Some(bulkhead.clone());
        }
        let mut bulkheads = self.bulkheads.write();
        if let Some(bulkhead) = bulkheads.get(scope) {
            return Some(bulkhead.clone());
        }
        let bulkhead = Arc::new(Bulkhead::new(config.clone()).ok()?);
        bulkheads.insert(scope.to_string(), bulkhead.clone());
        Some(bulkhead)
    }
}

/// A call let through by [`ResilienceGate::admit`]
///
/// Holds the bulkhead slot until dropped or finished.
#[must_use = "finish the admission so the circuit breaker learns the outcome"]
pub struct Admission {
    breaker: Option<Arc<CircuitBreaker>>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Admission {
    /// Record the outcome and release the bulkhead slot
    ///
    /// Network failures and 5xx statuses count against the circuit; other
    /// errors (not found, validation, auth, 429) leave it untouched.
    pub fn finish(self, error: Option<&BasecampError>) {
        let Some(breaker) = &self.breaker else { return };
        match error {
            None => breaker.record_success(),
            Some(err) if trips_circuit(err) => breaker.record_failure(),
            Some(_) => {}
        }
    }
}

fn trips_circuit(err: &BasecampError) -> bool {
    match err {
        BasecampError::Network(_) => true,
        other => other.http_status().is_some_and(|status| status >= 500),
    }
}

/// Run `future` with request-level gating switched off
///
/// Used by operation-level gating so the requests an operation issues are
/// not counted twice.
pub(crate) async fn within_operation<F: Future>(future: F) -> F::Output {
    OPERATION_ADMITTED.scope((), future).await
}

fn in_operation() -> bool {
    OPERATION_ADMITTED.try_with(|_| ()).is_ok()
}

/// Gates requests through a shared [`ResilienceGate`]
///
/// Outside an operation every request is admitted per URL host. Inside one,
/// the operation already holds the admission and requests pass straight
/// through. Responses always feed the rate limiter.
pub struct ResilienceMiddleware {
    gate: Arc<ResilienceGate>,
}

impl ResilienceMiddleware {
    #[must_use]
    pub const fn new(gate: Arc<ResilienceGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Middleware for ResilienceMiddleware {
    async fn handle(&self, request: RequestDescriptor, next: Next<'_>) -> Result<ResponseDescriptor> {
        let admission = if in_operation() {
            None
        } else {
            let scope = Url::parse(&request.url)
                .ok()
                .and_then(|url| url.host_str().map(str::to_owned))
                .unwrap_or_default();
            Some(self.gate.admit(&scope).await?)
        };

        let result = next.run(request).await;

        if let Ok(response) = &result {
            self.gate.note_response(response.status, response.retry_after());
        }
        if let Some(admission) = admission {
            let error = match &result {
                Ok(response) if response.is_success() => None,
                Ok(response) => Some(response.to_error()),
                Err(err) => Some(err.clone()),
            };
            admission.finish(error.as_ref());
        }
        result
    }
}
