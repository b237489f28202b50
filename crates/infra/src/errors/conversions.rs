//! Conversions from external infrastructure errors into domain errors.

use basecamp_common::auth::{TokenManagerError, TokenStoreError};
use basecamp_common::cache::CacheError;
use basecamp_common::BodyError;
use basecamp_domain::BasecampError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub BasecampError);

impl From<InfraError> for BasecampError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<BasecampError> for InfraError {
    fn from(value: BasecampError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoBasecampError {
    fn into_basecamp(self) -> BasecampError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → BasecampError */
/* -------------------------------------------------------------------------- */

impl IntoBasecampError for HttpError {
    fn into_basecamp(self) -> BasecampError {
        if self.is_timeout() {
            return BasecampError::Network("HTTP request timed out".into());
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return BasecampError::Network("HTTP connection failure".into());
        }

        if self.is_builder() {
            return BasecampError::Usage(format!("invalid HTTP request: {self}"));
        }

        // Resets and truncated bodies surface as request/body errors.
        BasecampError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_basecamp())
    }
}

/* -------------------------------------------------------------------------- */
/* Body, JSON, URL and I/O errors */
/* -------------------------------------------------------------------------- */

impl From<BodyError> for InfraError {
    fn from(value: BodyError) -> Self {
        Self(match value {
            BodyError::TooLarge { limit } => {
                BasecampError::Network(format!("response body exceeds {limit} byte limit"))
            }
            BodyError::Read { message, .. } => BasecampError::Network(message),
        })
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        Self(BasecampError::Validation(format!("invalid JSON: {value}")))
    }
}

impl From<url::ParseError> for InfraError {
    fn from(value: url::ParseError) -> Self {
        Self(BasecampError::Usage(format!("invalid URL: {value}")))
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        Self(BasecampError::Network(format!("I/O error: {value}")))
    }
}

impl From<CacheError> for InfraError {
    fn from(value: CacheError) -> Self {
        Self(BasecampError::Validation(value.to_string()))
    }
}

impl From<TokenStoreError> for InfraError {
    fn from(value: TokenStoreError) -> Self {
        Self(BasecampError::Auth(value.to_string()))
    }
}

impl From<TokenManagerError> for InfraError {
    fn from(value: TokenManagerError) -> Self {
        Self(value.into())
    }
}

/// Shorthand for `InfraError::from(err).into()`
pub(crate) fn to_domain<E: Into<InfraError>>(err: E) -> BasecampError {
    err.into().0
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
