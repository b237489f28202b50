//! Webhook delivery handling: verify, parse, dedup, dispatch

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use basecamp_common::security::verify_signature;
use basecamp_domain::{WebhookConfig, WebhookEvent};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::dedup::DedupWindow;
use super::id::extract_top_level_id;
use super::routing::match_pattern;

/// Why a delivery was rejected or failed
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing or wrong signature; nothing was parsed
    #[error("webhook signature verification failed")]
    Verification,

    #[error("invalid webhook payload: {0}")]
    Parse(String),

    #[error("webhook body exceeds {limit} byte limit")]
    TooLarge { limit: usize },

    /// A middleware or handler returned an error; the event may be
    /// redelivered
    #[error("webhook handler failed for event {event_id}: {error}")]
    Handler { event_id: String, error: anyhow::Error },
}

/// Handles one event
///
/// Implemented for every `Fn(Arc<WebhookEvent>) -> impl Future<Output =
/// anyhow::Result<()>>`.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, event: Arc<WebhookEvent>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> WebhookHandler for F
where
    F: Fn(Arc<WebhookEvent>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: Arc<WebhookEvent>) -> anyhow::Result<()> {
        self(event).await
    }
}

/// Wraps handler dispatch; the first registered middleware is outermost
#[async_trait]
pub trait WebhookMiddleware: Send + Sync {
    async fn handle(&self, event: Arc<WebhookEvent>, next: WebhookNext<'_>) -> anyhow::Result<()>;
}

/// The remaining middleware plus the matched handlers
#[derive(Clone, Copy)]
pub struct WebhookNext<'a> {
    rest: &'a [Arc<dyn WebhookMiddleware>],
    handlers: &'a [Arc<dyn WebhookHandler>],
}

impl WebhookNext<'_> {
    /// Continue inward; handlers run in order and the first error stops
    /// the rest
    pub async fn run(self, event: Arc<WebhookEvent>) -> anyhow::Result<()> {
        match self.rest.split_first() {
            Some((layer, rest)) => {
                layer.handle(event, WebhookNext { rest, handlers: self.handlers }).await
            }
            None => {
                for handler in self.handlers {
                    handler.handle(event.clone()).await?;
                }
                Ok(())
            }
        }
    }
}

/// Outcome of an accepted delivery
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub event: Arc<WebhookEvent>,
    /// Already seen or in flight; no handler ran
    pub duplicate: bool,
}

struct Route {
    /// `None` for catch-all handlers
    pattern: Option<String>,
    handler: Arc<dyn WebhookHandler>,
}

/// Verifies, deduplicates and routes webhook deliveries
///
/// Transport-agnostic; see [`super::server::router`] for the HTTP adapter.
pub struct WebhookReceiver {
    config: WebhookConfig,
    routes: RwLock<Vec<Route>>,
    middleware: RwLock<Vec<Arc<dyn WebhookMiddleware>>>,
    dedup: Option<DedupWindow>,
}

impl std::fmt::Debug for WebhookReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookReceiver")
            .field("path", &self.config.path)
            .field("verifies", &self.config.secret.is_some())
            .field("routes", &self.routes.read().len())
            .field("middleware", &self.middleware.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for WebhookReceiver {
    fn default() -> Self {
        Self::new(WebhookConfig::default())
    }
}

impl WebhookReceiver {
    /// A window size of 0 disables deduplication
    #[must_use]
    pub fn new(config: WebhookConfig) -> Self {
        if config.secret.is_none() {
            warn!("Webhook receiver has no secret; signatures will not be verified");
        }
        let dedup = (config.dedup_window_size > 0).then(|| DedupWindow::new(config.dedup_window_size));
        Self { config, routes: RwLock::default(), middleware: RwLock::default(), dedup }
    }

    #[must_use]
    pub const fn config(&self) -> &WebhookConfig {
        &self.config
    }

    #[must_use]
    pub const fn dedup(&self) -> Option<&DedupWindow> {
        self.dedup.as_ref()
    }

    /// Handle events whose kind matches `pattern` (exact or `*` glob)
    pub fn on<H: WebhookHandler + 'static>(&self, pattern: impl Into<String>, handler: H) -> &Self {
        self.routes.write().push(Route { pattern: Some(pattern.into()), handler: Arc::new(handler) });
        self
    }

    /// Handle every event, after the pattern handlers
    pub fn on_any<H: WebhookHandler + 'static>(&self, handler: H) -> &Self {
        self.routes.write().push(Route { pattern: None, handler: Arc::new(handler) });
        self
    }

    pub fn use_middleware<M: WebhookMiddleware + 'static>(&self, middleware: M) -> &Self {
        self.middleware.write().push(Arc::new(middleware));
        self
    }

    fn handlers_for(&self, kind: &str) -> Vec<Arc<dyn WebhookHandler>> {
        let routes = self.routes.read();
        let matched = routes
            .iter()
            .filter(|r| r.pattern.as_deref().is_some_and(|p| match_pattern(p, kind)))
            .map(|r| r.handler.clone());
        let catch_all = routes.iter().filter(|r| r.pattern.is_none()).map(|r| r.handler.clone());
        matched.chain(catch_all).collect()
    }

    /// Process one delivery
    ///
    /// `signature` is the value of the configured signature header. With a
    /// secret configured it must match before the body is parsed.
    ///
    /// # Errors
    /// [`WebhookError::TooLarge`], [`WebhookError::Verification`],
    /// [`WebhookError::Parse`], or [`WebhookError::Handler`] when a
    /// middleware or handler fails (the event is then not marked as seen).
    pub async fn handle_request(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookDelivery, WebhookError> {
        if body.len() > self.config.max_body_bytes {
            return Err(WebhookError::TooLarge { limit: self.config.max_body_bytes });
        }

        if let Some(secret) = &self.config.secret {
            let valid = signature.is_some_and(|sig| verify_signature(body, sig.trim(), secret));
            if !valid {
                warn!(has_signature = signature.is_some(), "Rejected webhook with invalid signature");
                return Err(WebhookError::Verification);
            }
        }

        let event = Arc::new(parse_event(body)?);
        debug!(event_id = %event.id, kind = %event.kind, "Webhook received");

        let claim = match &self.dedup {
            Some(window) if !event.id.is_empty() => match window.try_claim(&event.id) {
                Some(claim) => Some(claim),
                None => {
                    debug!(event_id = %event.id, "Duplicate webhook delivery ignored");
                    return Ok(WebhookDelivery { event, duplicate: true });
                }
            },
            _ => None,
        };

        let handlers = self.handlers_for(&event.kind);
        let middleware = self.middleware.read().clone();
        let next = WebhookNext { rest: &middleware, handlers: &handlers };

        if let Err(error) = next.run(event.clone()).await {
            warn!(event_id = %event.id, kind = %event.kind, error = %error, "Webhook handler failed");
            return Err(WebhookError::Handler { event_id: event.id.clone(), error });
        }

        if let Some(claim) = claim {
            claim.commit();
        }
        info!(event_id = %event.id, kind = %event.kind, handlers = handlers.len(), "Webhook handled");
        Ok(WebhookDelivery { event, duplicate: false })
    }
}

fn parse_event(body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let raw: Value = serde_json::from_slice(body).map_err(|e| WebhookError::Parse(e.to_string()))?;
    if !raw.is_object() {
        return Err(WebhookError::Parse("payload is not a JSON object".into()));
    }

    let mut event = WebhookEvent::deserialize(&raw).map_err(|e| WebhookError::Parse(e.to_string()))?;
    if let Some(id) = std::str::from_utf8(body).ok().and_then(extract_top_level_id) {
        event.id = id;
    }
    event.raw = raw;
    Ok(event)
}
