//! HTTP adapter for [`WebhookReceiver`]
//!
//! | outcome | status |
//! |---|---|
//! | handled or duplicate | 200 |
//! | malformed payload | 400 |
//! | bad signature | 401 |
//! | unknown path | 404 |
//! | not POST | 405 |
//! | body over the limit | 413 |
//! | handler failed | 500 |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::header::{ALLOW, CONTENT_LENGTH};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use basecamp_domain::{BasecampError, Result};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::receiver::{WebhookError, WebhookReceiver};

/// Router serving the receiver at its configured path
pub fn router(receiver: Arc<WebhookReceiver>) -> Router {
    let configured = receiver.config().path.trim();
    let path = if configured.starts_with('/') { configured.to_string() } else { format!("/{configured}") };

    Router::new()
        .route(&path, any(receive))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(receiver)
}

async fn receive(
    State(receiver): State<Arc<WebhookReceiver>>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, "POST")]).into_response();
    }

    let limit = receiver.config().max_body_bytes;
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let Ok(bytes) = to_bytes(body, limit).await else {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    };

    let signature = headers
        .get(receiver.config().signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    match receiver.handle_request(&bytes, signature).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(WebhookError::Verification) => StatusCode::UNAUTHORIZED.into_response(),
        Err(WebhookError::Parse(message)) => (StatusCode::BAD_REQUEST, message).into_response(),
        Err(WebhookError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE.into_response(),
        Err(err @ WebhookError::Handler { .. }) => {
            error!(error = %err, "Webhook delivery failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Webhook endpoint running on its own task
pub struct WebhookServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl WebhookServer {
    /// Bind `addr` (port 0 for an ephemeral port) and start serving.
    pub async fn start(receiver: Arc<WebhookReceiver>, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| BasecampError::Network(format!("failed to bind webhook server: {err}")))?;
        let addr = listener
            .local_addr()
            .map_err(|err| BasecampError::Network(format!("failed to determine address: {err}")))?;

        let app = router(receiver);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("Webhook server error: {}", err);
            }
        });

        info!(%addr, "Webhook server listening");
        Ok(Self { addr, shutdown_tx: Some(shutdown_tx), handle: Some(handle) })
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight deliveries.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for WebhookServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use basecamp_common::testing::{signed_webhook, webhook_payload};
    use basecamp_domain::{WebhookConfig, WebhookEvent};
    use tower::ServiceExt;

    use super::*;

    const SECRET: &str = "whsec";

    fn app(max_body_bytes: usize) -> Router {
        let receiver = WebhookReceiver::new(WebhookConfig {
            secret: Some(SECRET.into()),
            max_body_bytes,
            ..WebhookConfig::default()
        });
        receiver.on("todo_failed", |_event: Arc<WebhookEvent>| async { Err::<(), _>(anyhow::anyhow!("boom")) });
        router(Arc::new(receiver))
    }

    fn post(body: Vec<u8>, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/webhooks/basecamp").header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("x-basecamp-signature", sig);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn status(app: Router, request: Request<Body>) -> StatusCode {
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn signed_delivery_is_accepted() {
        let (body, sig) = signed_webhook(&webhook_payload(1, "todo_created"), SECRET);
        assert_eq!(status(app(1024 * 1024), post(body, Some(&sig))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn maps_failures_to_statuses() {
        let (body, _) = signed_webhook(&webhook_payload(1, "todo_created"), SECRET);
        assert_eq!(status(app(1024 * 1024), post(body, Some("00ff"))).await, StatusCode::UNAUTHORIZED);

        let (body, sig) = signed_webhook(&webhook_payload(2, "todo_failed"), SECRET);
        assert_eq!(status(app(1024 * 1024), post(body, Some(&sig))).await, StatusCode::INTERNAL_SERVER_ERROR);

        let get = Request::get("/webhooks/basecamp").body(Body::empty()).unwrap();
        let response = app(1024).oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "POST");

        let elsewhere = Request::post("/other").body(Body::empty()).unwrap();
        assert_eq!(status(app(1024), elsewhere).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let body = b"{not json".to_vec();
        let sig = basecamp_common::security::compute_signature(&body, SECRET);
        assert_eq!(status(app(1024), post(body, Some(&sig))).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (body, sig) = signed_webhook(&webhook_payload(1, "todo_created"), SECRET);
        assert_eq!(status(app(16), post(body, Some(&sig))).await, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn server_serves_over_tcp() {
        let receiver = Arc::new(WebhookReceiver::new(WebhookConfig::default()));
        let server = WebhookServer::start(receiver, "127.0.0.1:0".parse().unwrap()).await.unwrap();
        let url = format!("http://{}/webhooks/basecamp", server.local_addr());

        let response = reqwest::Client::new()
            .post(&url)
            .json(&webhook_payload(3, "message_created"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        server.shutdown().await;
    }
}
