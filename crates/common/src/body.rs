//! Bounded response body reads
//!
//! Bodies are streamed chunk by chunk and abandoned as soon as they pass the
//! ceiling, so an oversized or hostile response never gets buffered whole.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Failure reading a bounded body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    #[error("response body exceeds {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("failed to read response body: {message}")]
    Read { message: String, timeout: bool },
}

impl From<reqwest::Error> for BodyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Read { message: err.to_string(), timeout: err.is_timeout() }
    }
}

/// Read at most `limit` bytes of `response`
///
/// # Errors
/// [`BodyError::TooLarge`] as soon as the declared or streamed length
/// passes `limit`; [`BodyError::Read`] on transport failure.
pub async fn read_limited(mut response: reqwest::Response, limit: usize) -> Result<Bytes, BodyError> {
    if let Some(declared) = response.content_length() {
        if usize::try_from(declared).map_or(true, |len| len > limit) {
            return Err(BodyError::TooLarge { limit });
        }
    }

    let mut buf = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Read the first `limit` bytes of `response`, dropping the rest
///
/// Used for error bodies, where a truncated message beats no message.
///
/// # Errors
/// [`BodyError::Read`] on transport failure.
pub async fn read_prefix(mut response: reqwest::Response, limit: usize) -> Result<Bytes, BodyError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn fetch(body: &'static str, limit: usize) -> Result<Bytes, BodyError> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        let response = reqwest::get(server.uri()).await.unwrap();
        read_limited(response, limit).await
    }

    #[tokio::test]
    async fn reads_body_within_limit() {
        let body = fetch("hello", 5).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn rejects_body_over_limit() {
        let err = fetch("hello world", 5).await.unwrap_err();
        assert_eq!(err, BodyError::TooLarge { limit: 5 });
        assert_eq!(err.to_string(), "response body exceeds 5 byte limit");
    }

    #[tokio::test]
    async fn prefix_read_truncates_instead_of_failing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
            .mount(&server)
            .await;
        let response = reqwest::get(server.uri()).await.unwrap();
        let body = read_prefix(response, 8).await.unwrap();
        assert_eq!(&body[..], b"internal");
    }
}
