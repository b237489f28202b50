//! Resilience patterns for transient failures
//!
//! - **Retry Logic**: status-aware retry decisions with exponential backoff,
//!   additive jitter and `Retry-After` support
//! - **Circuit Breaker**: stops calling a failing scope until it recovers
//! - **Bulkhead**: caps concurrent operations
//! - **Rate Limiter**: client-side token bucket that also honours
//!   server `Retry-After` feedback
//!
//! [`ResilienceConfig`] bundles the last three; each part is optional.

use std::time::Duration;

use basecamp_domain::BasecampError;
use thiserror::Error;

pub mod bulkhead;
pub mod circuit_breaker;
pub mod clock;
pub mod rate_limiter;
pub mod retry;

pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadConfigBuilder};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use rate_limiter::{RateLimitConfig, RateLimitConfigBuilder, TokenBucket};
pub use retry::{
    parse_retry_after, AttemptResult, RetryConfig, RetryConfigBuilder, RetryConfigError,
    RetryDecision,
};

/// Invalid circuit breaker, bulkhead or rate limit configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid resilience configuration: {message}")]
pub struct ResilienceConfigError {
    pub message: String,
}

impl ResilienceConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// A call refused before it reached the network
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    #[error("circuit breaker open for {scope}")]
    CircuitOpen { scope: String },

    #[error("bulkhead full: {capacity} concurrent operations")]
    BulkheadFull { capacity: usize },

    #[error("client rate limit exceeded")]
    RateLimited {
        /// Remaining server-requested pause, if one is in force
        retry_after: Option<Duration>,
    },
}

impl From<ResilienceError> for BasecampError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::RateLimited { retry_after } => Self::RateLimit {
                // Round up so a sub-second pause is still reported
                retry_after: retry_after
                    .filter(|d| !d.is_zero())
                    .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0)),
            },
            other => Self::Network(other.to_string()),
        }
    }
}

/// Optional circuit breaker, bulkhead and client rate limit settings
///
/// `Default` turns all three on with their default settings; set a field to
/// `None` to drop that part.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub bulkhead: Option<BulkheadConfig>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: Some(CircuitBreakerConfig::default()),
            bulkhead: Some(BulkheadConfig::default()),
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

impl ResilienceConfig {
    /// All parts off
    pub fn disabled() -> Self {
        Self { circuit_breaker: None, bulkhead: None, rate_limit: None }
    }

    pub fn validate(&self) -> Result<(), ResilienceConfigError> {
        if let Some(config) = &self.circuit_breaker {
            config.validate()?;
        }
        if let Some(config) = &self.bulkhead {
            config.validate()?;
        }
        if let Some(config) = &self.rate_limit {
            config.validate()?;
        }
        Ok(())
    }
}
