//! # HTTP Server Module
//!
//! The axum server that fronts the users API. Every request lands in one fallback
//! handler, [`handle_request`], which asks the [`Router`] what to do with it and then
//! either runs the users operation against the node's [`UserStore`] or hands the
//! untouched request to the [`ProxyForwarder`].
//!
//! A node without a forwarder (standalone mode, or a worker in cluster mode) answers
//! unmatched requests with `404 {"error":"Endpoint not found."}`.

use crate::core::error::{GatewayError, GatewayResult};
use crate::proxy::ProxyForwarder;
use crate::routing::{RouteAction, Router};
use crate::store::{parse_user_id, UserPayload, UserStore};
use crate::store::users::INVALID_USER_ID;
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router as AxumRouter,
};
use metrics::counter;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name used in logs ("gateway", "worker-4001", ...)
    pub name: String,

    /// Server bind address
    pub bind_addr: SocketAddr,

    /// Maximum buffered request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "gateway".to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 4000)),
            max_body_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    /// Request router
    pub router: Arc<Router>,

    /// This node's users collection
    pub store: Arc<UserStore>,

    /// Forwarder for everything the users API does not handle
    pub forwarder: Option<Arc<ProxyForwarder>>,

    /// Server configuration
    pub config: ServerConfig,
}

/// HTTP Server implementation
pub struct GatewayServer {
    state: ServerState,
    app: AxumRouter,
}

impl GatewayServer {
    /// Create a server. Pass `None` as forwarder for a node that only serves the
    /// users API.
    pub fn new(
        config: ServerConfig,
        store: Arc<UserStore>,
        forwarder: Option<Arc<ProxyForwarder>>,
    ) -> GatewayResult<Self> {
        let state = ServerState {
            router: Arc::new(Router::new()?),
            store,
            forwarder,
            config,
        };

        let app = AxumRouter::new()
            .fallback(handle_request)
            .with_state(state.clone())
            .layer(TraceLayer::new_for_http());

        Ok(Self { state, app })
    }

    /// The axum application, for serving on a custom listener or driving in tests
    pub fn app(&self) -> AxumRouter {
        self.app.clone()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn name(&self) -> &str {
        &self.state.config.name
    }

    /// Get server bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.state.config.bind_addr
    }

    /// Bind the configured address
    pub async fn bind(&self) -> GatewayResult<TcpListener> {
        let addr = self.bind_addr();
        TcpListener::bind(addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind {} to {}: {}", self.name(), addr, e))
        })
    }

    /// Bind and serve until the process is stopped
    pub async fn start(self) -> GatewayResult<()> {
        let listener = self.bind().await?;
        self.serve(listener, std::future::pending()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let name = self.state.config.name.clone();
        info!(server = %name, addr = %addr, forwarding = self.state.forwarder.is_some(), "HTTP server listening");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::internal(format!("{} server error: {}", name, e)))?;

        info!(server = %name, "HTTP server stopped");
        Ok(())
    }
}

/// Main request handler that processes all incoming requests
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
async fn handle_request(State(state): State<ServerState>, request: Request) -> Response {
    let action = state
        .router
        .resolve(request.method(), request.uri().path());
    counter!("gateway_requests_total", "action" => action.name()).increment(1);

    let result = match action {
        RouteAction::ListUsers => Ok(json_response(StatusCode::OK, state.store.list())),
        RouteAction::GetUser(id) => state
            .store
            .get(&id)
            .map(|user| json_response(StatusCode::OK, user)),
        RouteAction::CreateUser => {
            let payload = read_payload(request.into_body(), state.config.max_body_size).await;
            state
                .store
                .create(payload)
                .map(|user| json_response(StatusCode::CREATED, user))
        }
        RouteAction::UpdateUser(id) => {
            if parse_user_id(&id).is_none() {
                Err(GatewayError::invalid_id(INVALID_USER_ID))
            } else {
                let payload = read_payload(request.into_body(), state.config.max_body_size).await;
                state
                    .store
                    .update(&id, payload)
                    .map(|user| json_response(StatusCode::OK, user))
            }
        }
        RouteAction::DeleteUser(id) => state
            .store
            .delete(&id)
            .map(|user| json_response(StatusCode::OK, user)),
        RouteAction::Forward => match &state.forwarder {
            Some(forwarder) => return forwarder.forward(request).await,
            None => Err(GatewayError::EndpointNotFound),
        },
    };

    result.unwrap_or_else(|error| {
        counter!("gateway_errors_total", "type" => error.error_type()).increment(1);
        error.into_response()
    })
}

/// Accumulate the whole body and parse it. A body that cannot be read is treated
/// like malformed JSON: an empty payload.
async fn read_payload(body: Body, limit: usize) -> UserPayload {
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => UserPayload::parse(&bytes),
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            UserPayload::default()
        }
    }
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, Method};
    use tower::ServiceExt;

    fn create_test_server() -> GatewayServer {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(), // Use random port for tests
            ..Default::default()
        };

        GatewayServer::new(config, Arc::new(UserStore::new()), None).unwrap()
    }

    async fn send(server: &GatewayServer, method: Method, uri: &str, body: Body) -> Response {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        server.app().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = create_test_server();
        assert_eq!(server.bind_addr().ip().to_string(), "127.0.0.1");
        assert_eq!(server.name(), "gateway");
        assert!(server.state().forwarder.is_none());
    }

    #[tokio::test]
    async fn test_empty_list() {
        let server = create_test_server();
        let response = send(&server, Method::GET, "/api/users", Body::empty()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unmatched_route_without_forwarder() {
        let server = create_test_server();
        let response = send(&server, Method::GET, "/unknown/path", Body::empty()).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "Endpoint not found." })
        );
    }

    #[tokio::test]
    async fn test_update_invalid_id_checked_before_body() {
        let server = create_test_server();
        let response = send(
            &server,
            Method::PUT,
            "/api/users/not-a-uuid",
            Body::from("{ broken"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "Invalid user id" })
        );
    }

    #[tokio::test]
    async fn test_oversized_body_is_empty_payload() {
        let config = ServerConfig {
            max_body_size: 8,
            ..Default::default()
        };
        let server = GatewayServer::new(config, Arc::new(UserStore::new()), None).unwrap();

        let response = send(
            &server,
            Method::POST,
            "/api/users",
            Body::from(r#"{"username":"ann","age":30}"#),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(server.state().store.is_empty());
    }
}
