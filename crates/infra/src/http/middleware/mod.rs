//! Request middleware
//!
//! Each middleware wraps the rest of the chain: it receives the request and
//! a [`Next`] handle, and may rewrite the request, answer it without calling
//! inward, call inward more than once, or post-process the response.
//!
//! Canonical order, outermost first: [`HooksMiddleware`] →
//! [`ResilienceMiddleware`] (optional) → [`CacheMiddleware`] →
//! [`RetryMiddleware`] → [`AuthMiddleware`] → transport. Because retry sits
//! inside cache and hooks, repeated attempts only re-run auth and the
//! transport; the circuit breaker sees the settled outcome of all attempts.

mod auth;
mod cache;
mod hooks;
mod resilience;
mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use basecamp_domain::Result;

pub use auth::AuthMiddleware;
pub use cache::CacheMiddleware;
pub use hooks::HooksMiddleware;
pub(crate) use resilience::within_operation;
pub use resilience::{Admission, ResilienceGate, ResilienceMiddleware};
pub use retry::RetryMiddleware;

use super::descriptor::{RequestDescriptor, ResponseDescriptor};
use super::transport::Transport;

/// One layer of the pipeline
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: RequestDescriptor, next: Next<'_>) -> Result<ResponseDescriptor>;
}

/// The layers inside the current one
///
/// `Copy`, so a layer may run the remainder of the chain several times.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(rest: &'a [Arc<dyn Middleware>], transport: &'a dyn Transport) -> Self {
        Self { rest, transport }
    }

    /// Hand `request` to the next layer
    pub async fn run(self, request: RequestDescriptor) -> Result<ResponseDescriptor> {
        match self.rest.split_first() {
            Some((layer, rest)) => layer.handle(request, Next::new(rest, self.transport)).await,
            None => self.transport.send(&request).await,
        }
    }
}
