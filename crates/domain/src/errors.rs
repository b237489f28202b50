//! Error types used throughout the client
//!
//! Every failure the request pipeline surfaces is one of the variants of
//! [`BasecampError`]. The variants follow the API's error codes so callers can
//! branch on [`BasecampError::code`] without string matching.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_domain_status_conversions;

/// Stable, machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Auth,
    Forbidden,
    NotFound,
    RateLimit,
    Network,
    Api,
    Usage,
}

impl_domain_status_conversions!(ErrorCode {
    Validation => "validation",
    Auth => "auth",
    Forbidden => "forbidden",
    NotFound => "not_found",
    RateLimit => "rate_limit",
    Network => "network",
    Api => "api_error",
    Usage => "usage",
});

impl ErrorCode {
    /// Process exit code for CLI front-ends built on the client
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Usage | Self::Validation => 1,
            Self::NotFound => 2,
            Self::Auth => 3,
            Self::Forbidden => 4,
            Self::RateLimit => 5,
            Self::Network => 6,
            Self::Api => 7,
        }
    }
}

/// Main error type for the Basecamp client
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum BasecampError {
    /// Bad input; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// 401-class failure; the caller may refresh credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 429 from the API. `retry_after` is `None` when the server sent no
    /// usable `Retry-After` value.
    #[error("Rate limited: {}", RetryHint(.retry_after))]
    RateLimit { retry_after: Option<u64> },

    /// Timeouts, connection failures and resets
    #[error("Network error: {0}")]
    Network(String),

    /// Any other non-success status from the API
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Caller misconfiguration (non-HTTPS endpoint, cross-origin link, ...)
    #[error("Usage error: {0}")]
    Usage(String),
}

struct RetryHint<'a>(&'a Option<u64>);

impl fmt::Display for RetryHint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(secs) => write!(f, "try again in {secs} seconds"),
            None => write!(f, "try again later"),
        }
    }
}

impl BasecampError {
    /// Error code for this error
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Auth(_) => ErrorCode::Auth,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::RateLimit { .. } => ErrorCode::RateLimit,
            Self::Network(_) => ErrorCode::Network,
            Self::Api { .. } => ErrorCode::Api,
            Self::Usage(_) => ErrorCode::Usage,
        }
    }

    /// Whether a transient-failure policy may repeat the request
    ///
    /// Rate limits, network failures and 5xx API errors are retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-requested delay before the next attempt, if any
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after: Some(secs) } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// HTTP status that produced this error, when one did
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Auth(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::RateLimit { .. } => Some(429),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Exit code for CLI front-ends
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    /// Prefix the error message with additional context, keeping the variant
    #[must_use]
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            Self::Validation(msg) => Self::Validation(format!("{context}: {msg}")),
            Self::Auth(msg) => Self::Auth(format!("{context}: {msg}")),
            Self::Forbidden(msg) => Self::Forbidden(format!("{context}: {msg}")),
            Self::NotFound(msg) => Self::NotFound(format!("{context}: {msg}")),
            Self::Network(msg) => Self::Network(format!("{context}: {msg}")),
            Self::Usage(msg) => Self::Usage(format!("{context}: {msg}")),
            Self::Api { status, message } => {
                Self::Api { status, message: format!("{context}: {message}") }
            }
            rate_limit @ Self::RateLimit { .. } => rate_limit,
        }
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, BasecampError>;
