use std::sync::Arc;

use async_trait::async_trait;
use basecamp_common::cache::{cache_key, CacheEntry, CacheStore};
use basecamp_domain::Result;
use reqwest::header::{HeaderValue, CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::Method;
use tracing::{debug, warn};

use super::{Middleware, Next};
use crate::http::descriptor::{RequestDescriptor, ResponseDescriptor};

/// ETag revalidation for GET requests
///
/// Sends `If-None-Match` when an entry exists, turns a 304 into the cached
/// 200 (`from_cache = true`), and stores every 200 that carries an `ETag`.
/// Store failures are logged and treated as misses.
pub struct CacheMiddleware {
    store: Arc<dyn CacheStore>,
}

impl CacheMiddleware {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "Cache lookup failed; treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: String, response: &ResponseDescriptor) {
        let Some(etag) = response.etag() else { return };

        let mut entry = CacheEntry::new(key, etag, response.body.clone());
        if let Some(content_type) = response.header(CONTENT_TYPE.as_str()) {
            entry = entry.with_content_type(content_type);
        }
        if let Err(err) = self.store.put(entry).await {
            warn!(error = %err, "Failed to store response in cache");
        }
    }
}

#[async_trait]
impl Middleware for CacheMiddleware {
    async fn handle(&self, mut request: RequestDescriptor, next: Next<'_>) -> Result<ResponseDescriptor> {
        if request.method != Method::GET {
            return next.run(request).await;
        }

        let key = cache_key(request.method.as_str(), &request.full_url()?);
        let cached = self.lookup(&key).await;

        if let Some(entry) = &cached {
            match HeaderValue::from_str(&entry.etag) {
                Ok(value) => {
                    request.headers.insert(IF_NONE_MATCH, value);
                }
                Err(_) => warn!(key = %key, "Cached ETag is not a valid header value; skipping revalidation"),
            }
        }

        let mut response = next.run(request).await?;

        match (response.status, cached) {
            (304, Some(entry)) => {
                debug!(key = %key, "Cache revalidated");
                response.status = entry.status;
                response.body = entry.body;
                response.from_cache = true;
                if let Some(content_type) = entry.content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
                    response.headers.insert(CONTENT_TYPE, content_type);
                }
            }
            (200, _) => self.store(key, &response).await,
            _ => {}
        }

        Ok(response)
    }
}
