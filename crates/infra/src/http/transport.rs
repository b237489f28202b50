use std::time::{Duration, Instant};

use async_trait::async_trait;
use basecamp_common::{read_limited, read_prefix};
use basecamp_domain::constants::{
    DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, MAX_ERROR_BODY_BYTES, MAX_RESPONSE_BODY_BYTES,
};
use basecamp_domain::Result;
use reqwest::Client as ReqwestClient;
use tracing::debug;

use super::descriptor::{RequestDescriptor, ResponseDescriptor};
use crate::errors::conversions::to_domain;

/// The innermost layer: puts a request on the wire
///
/// Any HTTP status is a response. Only failures to get one (timeouts,
/// connection errors, oversized bodies) are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor>;
}

/// `reqwest`-backed transport with a per-attempt timeout
#[derive(Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Start building a new transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor> {
        let url = request.full_url()?;
        let method = request.method.clone();

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(request.headers.clone())
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!(attempt = request.attempt, %method, %url, "sending HTTP request");
        let started = Instant::now();

        let response = builder.send().await.map_err(|err| {
            debug!(attempt = request.attempt, %method, %url, error = %err, "HTTP request failed");
            to_domain(err)
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let final_url = response.url().clone();

        let body = if status < 400 {
            read_limited(response, MAX_RESPONSE_BODY_BYTES).await
        } else {
            read_prefix(response, MAX_ERROR_BODY_BYTES).await
        }
        .map_err(to_domain)?;

        let duration = started.elapsed();
        debug!(
            attempt = request.attempt,
            %method,
            %url,
            status,
            duration_ms = duration.as_millis(),
            "received HTTP response"
        );

        Ok(ResponseDescriptor { status, headers, body, from_cache: false, duration, url: final_url })
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    timeout: Duration,
    user_agent: String,
    default_headers: Option<reqwest::header::HeaderMap>,
    client: Option<ReqwestClient>,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: None,
            client: None,
        }
    }
}

impl ReqwestTransportBuilder {
    /// Per-attempt timeout, covering connect through the last body byte.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Reuse an existing client; user agent and default headers are then
    /// the client's own.
    pub fn client(mut self, client: ReqwestClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<ReqwestTransport> {
        if let Some(client) = self.client {
            return Ok(ReqwestTransport { client, timeout: self.timeout });
        }

        let mut builder = ReqwestClient::builder().user_agent(self.user_agent);
        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(to_domain)?;
        Ok(ReqwestTransport { client, timeout: self.timeout })
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use basecamp_domain::BasecampError;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn returns_error_statuses_as_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().expect("transport");
        let response =
            transport.send(&RequestDescriptor::get(server.uri())).await.expect("response");

        assert_eq!(response.status, 404);
        assert_eq!(response.text(), "missing");
        assert!(!response.from_cache);
    }

    #[tokio::test]
    async fn sends_method_query_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/999/todos.json"))
            .and(query_param("notify", "true"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"content":"ship it"}"#))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let request = RequestDescriptor::post(format!("{}/999/todos.json", server.uri()))
            .with_query("notify", "true")
            .json(&serde_json::json!({"content": "ship it"}))
            .unwrap();
        let response = ReqwestTransport::new().unwrap().send(&request).await.unwrap();
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn timeout_is_a_retryable_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport =
            ReqwestTransport::builder().timeout(Duration::from_millis(50)).build().unwrap();
        let err = transport.send(&RequestDescriptor::get(server.uri())).await.unwrap_err();

        assert!(matches!(err, BasecampError::Network(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ReqwestTransport::new()
            .unwrap()
            .send(&RequestDescriptor::get(format!("http://{addr}")))
            .await
            .unwrap_err();
        assert!(matches!(err, BasecampError::Network(_)));
    }

    #[tokio::test]
    async fn relative_url_is_a_usage_error() {
        let err = ReqwestTransport::new()
            .unwrap()
            .send(&RequestDescriptor::get("projects.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, BasecampError::Usage(_)));
    }
}
