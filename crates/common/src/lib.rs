//! Shared building blocks for the Basecamp client
//!
//! Everything here is transport-agnostic: the request pipeline in
//! `basecamp-infra` composes these pieces.
//!
//! - [`auth`]: OAuth discovery, PKCE, token endpoint client, token stores,
//!   single-flight token manager, login orchestration
//! - [`cache`]: ETag cache keys and stores
//! - [`resilience`]: retry decisions, backoff and `Retry-After` parsing,
//!   circuit breaker, bulkhead and client-side token bucket
//! - [`security`]: endpoint checks, header redaction, HMAC signatures
//! - [`error`]: error classification shared by the layers above
//! - [`body`]: size-limited response body reads
//!
//! # Features
//!
//! - `test-utils`: mocks, fixtures and test tracing setup ([`testing`])

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod body;
pub mod cache;
pub mod error;
pub mod resilience;
pub mod security;
pub mod storage;

#[cfg(any(feature = "test-utils", test))]
pub mod testing;

pub use body::{read_limited, read_prefix, BodyError};
pub use error::{truncate_message, ErrorClassification, ErrorSeverity};
pub use resilience::{
    parse_retry_after, AttemptResult, ResilienceConfig, ResilienceError, RetryConfig, RetryDecision,
};
