//! # Proxy Forwarder
//!
//! Relays a request that the users API does not handle to a worker picked by the load
//! balancer, and relays the worker's answer back.
//!
//! - The outbound request reuses the inbound method, headers, path and query.
//! - The inbound body is streamed to the worker through a bounded channel, so a slow
//!   worker applies backpressure to the client instead of the body piling up here.
//! - The worker's status code and `Content-Type` are copied onto the response and its
//!   body is streamed back chunk by chunk, byte for byte.
//! - Any transport failure before the response head arrives (refused, reset, timeout)
//!   becomes the fixed `502 {"error":"Internal proxy error"}` response.
//!
//! The server speaks `http` 1.x types (axum) while `reqwest` 0.11 speaks `http` 0.2,
//! so methods, headers and status codes are converted through their wire form.

use crate::core::config::WorkerPoolConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::WorkerAddress;
use crate::load_balancing::LoadBalancer;
use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

/// Chunks buffered between the inbound body and the outbound connection
const BODY_CHANNEL_CAPACITY: usize = 16;

/// Forwards requests to the worker pool
pub struct ProxyForwarder {
    client: reqwest::Client,
    balancer: Arc<dyn LoadBalancer>,
}

impl ProxyForwarder {
    /// Create a forwarder with an HTTP client bounded by the pool's timeouts
    pub fn new(balancer: Arc<dyn LoadBalancer>, config: &WorkerPoolConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .connect_timeout(config.connect_timeout)
            // Redirects are the worker's answer, not something to follow here
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, balancer })
    }

    pub fn balancer(&self) -> &Arc<dyn LoadBalancer> {
        &self.balancer
    }

    /// Select a worker and relay the request to it. Never fails: transport errors are
    /// already translated into the fixed proxy error response.
    #[instrument(skip_all, fields(method = %request.method(), uri = %request.uri(), worker = tracing::field::Empty))]
    pub async fn forward(&self, request: Request) -> Response {
        let worker = self.balancer.select();
        tracing::Span::current().record("worker", tracing::field::display(&worker));
        counter!("gateway_upstream_requests_total").increment(1);

        match self.relay(&worker, request).await {
            Ok(response) => response,
            Err(error) => {
                if let GatewayError::Proxy { worker, reason } = &error {
                    warn!(worker = %worker, reason = %reason, "Failed to reach worker");
                }
                counter!("proxy_upstream_errors_total").increment(1);
                error.into_response()
            }
        }
    }

    async fn relay(&self, worker: &WorkerAddress, request: Request) -> GatewayResult<Response> {
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", worker.base_url(), path_and_query);

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .map_err(|e| GatewayError::proxy(worker.to_string(), e.to_string()))?;

        let mut outbound = self
            .client
            .request(method, &url)
            .headers(to_upstream_headers(&parts.headers));

        if !body.is_end_stream() {
            outbound = outbound.body(stream_body(body));
        }

        debug!(url = %url, "Forwarding request to worker");

        let upstream = outbound.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out: {}", e)
            } else {
                e.to_string()
            };
            GatewayError::proxy(worker.to_string(), reason)
        })?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .map_err(|e| GatewayError::proxy(worker.to_string(), e.to_string()))?;

        let mut response = Response::builder().status(status);
        if let Some(content_type) = upstream
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| HeaderValue::from_bytes(value.as_bytes()).ok())
        {
            response = response.header(header::CONTENT_TYPE, content_type);
        }

        debug!(status = status.as_u16(), "Worker responded, relaying body");

        let worker_name = worker.to_string();
        let body = upstream.bytes_stream().inspect_err(move |e| {
            warn!(worker = %worker_name, error = %e, "Worker response body interrupted");
        });

        response
            .body(Body::from_stream(body))
            .map_err(|e| GatewayError::internal(format!("Failed to build proxied response: {}", e)))
    }
}

/// Copy inbound headers onto an outbound header map, keeping repeated values
fn to_upstream_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut upstream = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            upstream.append(name, value);
        }
    }
    upstream
}

/// Pipe the inbound body into a `reqwest::Body`.
///
/// `reqwest` wants a `Sync` stream and axum's body is not, so a task pumps frames
/// into a bounded channel whose receiver is handed to the client.
fn stream_body(body: Body) -> reqwest::Body {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(BODY_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut frames = body.into_data_stream();
        while let Some(frame) = frames.next().await {
            let chunk = frame.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() || failed {
                break;
            }
        }
    });

    reqwest::Body::wrap_stream(ReceiverStream::new(rx))
}
