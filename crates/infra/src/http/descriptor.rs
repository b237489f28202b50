//! Request and response descriptors
//!
//! A [`RequestDescriptor`] is what flows down the middleware chain; a
//! [`ResponseDescriptor`] is what flows back up. Bodies are fully buffered
//! so any layer may inspect them and any attempt may be replayed.

use std::time::Duration;

use basecamp_common::resilience::parse_retry_after;
use basecamp_common::security::{redact_headers, resolve_url};
use basecamp_common::truncate_message;
use basecamp_domain::constants::MAX_ERROR_MESSAGE_BYTES;
use basecamp_domain::{BasecampError, Result};
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, ETAG, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::errors::conversions::to_domain;
use crate::observability::RequestInfo;
use crate::pagination::link::next_link;

/// An outgoing request
///
/// Each attempt is its own descriptor: [`RequestDescriptor::next_attempt`]
/// copies everything and bumps the counter.
#[derive(Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Absolute URL, or a path resolved against the pipeline base URL
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Starts at 1
    pub attempt: u32,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            attempt: 1,
        }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body
    ///
    /// # Errors
    /// `Validation` when `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(to_domain)?;
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// Anything other than GET, HEAD and OPTIONS
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// The same request, attempt number + 1
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self { attempt: self.attempt + 1, ..self.clone() }
    }

    /// Absolute URL with the query parameters appended
    ///
    /// # Errors
    /// `Usage` when `url` is not absolute.
    pub fn full_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url).map_err(to_domain)?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }

    /// Make `url` absolute against `base`
    ///
    /// # Errors
    /// `Validation` when the URL cannot be resolved.
    pub fn resolve(mut self, base: &Url) -> Result<Self> {
        if Url::parse(&self.url).is_err() {
            self.url = resolve_url(base, &self.url)?.to_string();
        }
        Ok(self)
    }

    /// Method, URL and attempt, for hooks
    #[must_use]
    pub fn info(&self) -> RequestInfo {
        let url = self.full_url().map_or_else(|_| self.url.clone(), |u| u.to_string());
        RequestInfo { method: self.method.to_string(), url, attempt: self.attempt }
    }
}

impl std::fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("headers", &redact_headers(&self.headers))
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// A settled response
#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Served from the ETag cache after a 304
    pub from_cache: bool,
    pub duration: Duration,
    /// URL the response came from
    pub url: Url,
}

impl ResponseDescriptor {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Body as UTF-8, lossily
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// # Errors
    /// `Validation` when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(to_domain)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.headers.get(ETAG).and_then(|v| v.to_str().ok()).filter(|v| !v.is_empty())
    }

    /// Parsed `Retry-After`; absent, zero and past values are `None`
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()))
    }

    /// Raw `rel="next"` target, unresolved
    #[must_use]
    pub fn next_link(&self) -> Option<String> {
        next_link(&self.headers)
    }

    /// `Ok(self)` for status < 400, else the mapped error
    ///
    /// # Errors
    /// The [`BasecampError`] for the status; see [`ResponseDescriptor::to_error`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.to_error())
        }
    }

    /// Map the status to the error taxonomy
    ///
    /// The message is the JSON `error` field when present, else the body
    /// text, truncated.
    #[must_use]
    pub fn to_error(&self) -> BasecampError {
        let message = self.error_message();
        match self.status {
            401 => BasecampError::Auth(message),
            403 => BasecampError::Forbidden(message),
            404 => BasecampError::NotFound(message),
            429 => BasecampError::RateLimit { retry_after: self.retry_after().map(|d| d.as_secs()).filter(|s| *s > 0) },
            400 | 422 => BasecampError::Validation(message),
            status => BasecampError::Api { status, message },
        }
    }

    fn error_message(&self) -> String {
        let from_json = serde_json::from_slice::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string));
        let message = from_json.unwrap_or_else(|| self.text().trim().to_string());
        let message = if message.is_empty() { format!("HTTP {}", self.status) } else { message };
        truncate_message(&message, MAX_ERROR_MESSAGE_BYTES)
    }
}
