use std::sync::Arc;

use async_trait::async_trait;
use basecamp_common::resilience::{AttemptResult, RetryConfig, RetryDecision};
use basecamp_domain::Result;
use tracing::debug;

use super::{Middleware, Next};
use crate::http::descriptor::{RequestDescriptor, ResponseDescriptor};
use crate::observability::{isolate, Hooks};

/// Repeats transient failures according to a [`RetryConfig`]
///
/// Every repeated attempt is announced through `on_retry` before the sleep.
/// The last response (or error) is returned as-is; status mapping happens
/// at the pipeline boundary.
pub struct RetryMiddleware {
    config: RetryConfig,
    hooks: Arc<dyn Hooks>,
}

impl RetryMiddleware {
    #[must_use]
    pub fn new(config: RetryConfig, hooks: Arc<dyn Hooks>) -> Self {
        Self { config, hooks }
    }

    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    async fn handle(&self, request: RequestDescriptor, next: Next<'_>) -> Result<ResponseDescriptor> {
        let mut request = request;
        loop {
            let outcome = next.run(request.clone()).await;

            let (attempt_result, error) = match &outcome {
                Ok(response) if response.is_success() => return outcome,
                Ok(response) => (
                    AttemptResult::Status { status: response.status, retry_after: response.retry_after() },
                    response.to_error(),
                ),
                Err(err) => (AttemptResult::Failed { retryable: err.is_retryable() }, err.clone()),
            };

            match self.config.decide(request.attempt, request.is_mutation(), attempt_result) {
                RetryDecision::Stop => return outcome,
                RetryDecision::Retry(delay) => {
                    let next_attempt = request.next_attempt();
                    let info = next_attempt.info();
                    debug!(
                        method = %info.method,
                        url = %info.url,
                        attempt = next_attempt.attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "Scheduling retry"
                    );
                    isolate("on_retry", || self.hooks.on_retry(&info, next_attempt.attempt, &error, delay));

                    tokio::time::sleep(delay).await;
                    request = next_attempt;
                }
            }
        }
    }
}
