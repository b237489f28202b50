use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use basecamp_domain::Result;

use super::{Middleware, Next};
use crate::http::descriptor::{RequestDescriptor, ResponseDescriptor};
use crate::observability::{isolate, Hooks, RequestResult};

/// Reports request start and end to a [`Hooks`] observer
///
/// Sits outermost, so it sees the settled outcome after retries and cache
/// handling, once per request.
pub struct HooksMiddleware {
    hooks: Arc<dyn Hooks>,
}

impl HooksMiddleware {
    #[must_use]
    pub fn new(hooks: Arc<dyn Hooks>) -> Self {
        Self { hooks }
    }
}

#[async_trait]
impl Middleware for HooksMiddleware {
    async fn handle(&self, request: RequestDescriptor, next: Next<'_>) -> Result<ResponseDescriptor> {
        let info = request.info();
        isolate("on_request_start", || self.hooks.on_request_start(&info));

        let started = Instant::now();
        let outcome = next.run(request).await;

        let result = match &outcome {
            Ok(response) => RequestResult {
                status: Some(response.status),
                error: (!response.is_success()).then(|| response.to_error()),
                duration: started.elapsed(),
                from_cache: response.from_cache,
            },
            Err(err) => RequestResult {
                status: None,
                error: Some(err.clone()),
                duration: started.elapsed(),
                from_cache: false,
            },
        };
        isolate("on_request_end", || self.hooks.on_request_end(&info, &result));

        outcome
    }
}
