//! # Proxy Forwarding Integration Tests
//!
//! - requests the users API does not handle are relayed unchanged to a worker
//! - worker status, content type and body come back byte for byte
//! - round-robin order across real listeners
//! - an unreachable or too slow worker yields `502 {"error":"Internal proxy error"}`
//! - large binary bodies stream through unchanged, past the users API body limit
//! - a cluster deployment serving end to end

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use axum::Router as AxumRouter;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use users_gateway::core::config::{DeploymentMode, GatewayConfig, WorkerPoolConfig};
use users_gateway::load_balancing::{LoadBalancer, RoundRobinBalancer, WorkerRegistry};
use users_gateway::proxy::ProxyForwarder;
use users_gateway::store::UserStore;
use users_gateway::{Deployment, GatewayServer, ServerConfig};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn forwarder_for(base_port: u16, count: usize) -> Arc<ProxyForwarder> {
    forwarder_with_timeout(base_port, count, Duration::from_secs(5))
}

fn forwarder_with_timeout(base_port: u16, count: usize, upstream_timeout: Duration) -> Arc<ProxyForwarder> {
    let registry = WorkerRegistry::build("127.0.0.1", base_port, count).unwrap();
    let balancer: Arc<dyn LoadBalancer> = Arc::new(RoundRobinBalancer::new(Arc::new(registry)));
    let config = WorkerPoolConfig {
        upstream_timeout,
        connect_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    Arc::new(ProxyForwarder::new(balancer, &config).unwrap())
}

/// Serve a front-end on a real socket and return its base URL
async fn spawn_frontend(forwarder: Arc<ProxyForwarder>, max_body_size: usize) -> String {
    let config = ServerConfig {
        max_body_size,
        ..Default::default()
    };
    let server = GatewayServer::new(config, Arc::new(UserStore::new()), Some(forwarder)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener, std::future::pending()));
    format!("http://{}", addr)
}

/// Start a worker app on an ephemeral port and return the port
async fn spawn_worker(app: AxumRouter) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn frontend(forwarder: Arc<ProxyForwarder>) -> TestServer {
    let server = GatewayServer::new(
        ServerConfig::default(),
        Arc::new(UserStore::new()),
        Some(forwarder),
    )
    .unwrap();
    TestServer::new(server.app()).unwrap()
}

/// Bind `count` listeners on consecutive local ports
async fn bind_consecutive(count: usize) -> (u16, Vec<TcpListener>) {
    for _ in 0..50 {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = first.local_addr().unwrap().port();
        let mut listeners = vec![first];

        for offset in 1..count {
            let Some(port) = base.checked_add(offset as u16) else {
                break;
            };
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => listeners.push(listener),
                Err(_) => break,
            }
        }

        if listeners.len() == count {
            return (base, listeners);
        }
    }
    panic!("could not find {} consecutive free ports", count);
}

/// A worker that answers every request with its own port
fn spawn_port_echo(listener: TcpListener) {
    let port = listener.local_addr().unwrap().port();
    let app = AxumRouter::new().fallback(move || async move { format!("worker-{}", port) });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

#[tokio::test]
async fn test_request_is_relayed_unchanged() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders/42"))
        .and(query_param("expand", "items"))
        .and(header("x-request-id", "abc-123"))
        .and(body_string("raw payload"))
        .respond_with(
            ResponseTemplate::new(202).set_body_raw("accepted by worker", "text/plain"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let server = frontend(forwarder_for(mock_server.address().port(), 1));

    let response = server
        .post("/orders/42")
        .add_query_param("expand", "items")
        .add_header(
            "x-request-id".parse().unwrap(),
            "abc-123".parse().unwrap(),
        )
        .text("raw payload")
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(response.header("content-type").to_str().unwrap(), "text/plain");
    response.assert_text("accepted by worker");
}

#[tokio::test]
async fn test_worker_error_status_passes_through() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(
            ResponseTemplate::new(418).set_body_raw(r#"{"teapot":true}"#, "application/json"),
        )
        .mount(&mock_server)
        .await;

    let server = frontend(forwarder_for(mock_server.address().port(), 1));
    let response = server.get("/missing").await;

    response.assert_status(StatusCode::IM_A_TEAPOT);
    response.assert_json(&json!({ "teapot": true }));
}

#[tokio::test]
async fn test_users_routes_are_not_forwarded() {
    let mock_server = MockServer::start().await;
    let server = frontend(forwarder_for(mock_server.address().port(), 1));

    server.get("/api/users").await.assert_json(&json!([]));
    server
        .post("/api/users")
        .json(&json!({ "username": "Ann", "age": 30 }))
        .await
        .assert_status(StatusCode::CREATED);

    let received = mock_server.received_requests().await.unwrap();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_round_robin_across_workers() {
    let (base_port, listeners) = bind_consecutive(2).await;
    for listener in listeners {
        spawn_port_echo(listener);
    }

    let forwarder = forwarder_for(base_port, 2);
    let server = frontend(forwarder.clone());

    let mut answers = Vec::new();
    for _ in 0..3 {
        answers.push(server.get("/whoami").await.text());
    }

    let first = format!("worker-{}", base_port);
    let second = format!("worker-{}", base_port + 1);
    assert_eq!(answers, vec![first.clone(), second.clone(), first]);

    // Three dispatches over two workers: the next one goes to the second
    assert_eq!(forwarder.balancer().stats().next_worker, base_port + 1);
    assert_eq!(server.get("/whoami").await.text(), second);
}

#[tokio::test]
async fn test_unreachable_worker_is_bad_gateway() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let server = frontend(forwarder_for(port, 1));

    let response = server.get("/unknown/path").await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    response.assert_json(&json!({ "error": "Internal proxy error" }));
}

#[tokio::test]
async fn test_slow_worker_times_out_as_bad_gateway() {
    let app = AxumRouter::new().fallback(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "too late"
    });
    let port = spawn_worker(app).await;
    let base_url = spawn_frontend(
        forwarder_with_timeout(port, 1, Duration::from_millis(300)),
        16 * 1024 * 1024,
    )
    .await;

    let started = std::time::Instant::now();
    let response = reqwest::get(format!("{}/slow", base_url)).await.unwrap();

    assert_eq!(response.status().as_u16(), 502);
    assert!(started.elapsed() < Duration::from_secs(4));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Internal proxy error" }));
}

#[tokio::test]
async fn test_large_binary_body_streams_through_unchanged() {
    // Echo the body and its content type; axum's own 2 MB limit is lifted
    let app = AxumRouter::new()
        .fallback(|headers: HeaderMap, body: Bytes| async move {
            let content_type = headers
                .get(CONTENT_TYPE)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
            ([(CONTENT_TYPE, content_type)], body)
        })
        .layer(DefaultBodyLimit::disable());
    let port = spawn_worker(app).await;

    // The users API limit is far below the body size; forwarding must ignore it
    let base_url = spawn_frontend(forwarder_for(port, 1), 8).await;

    let payload: Vec<u8> = (0..3_000_000u32)
        .map(|i| ((i * 7 + 0x80) % 256) as u8)
        .collect();
    assert!(std::str::from_utf8(&payload).is_err());

    let response = reqwest::Client::new()
        .post(format!("{}/upload/blob", base_url))
        .header("content-type", "application/x-custom-binary")
        .body(payload.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/x-custom-binary"
    );
    let echoed = response.bytes().await.unwrap();
    assert_eq!(echoed.len(), payload.len());
    assert!(echoed.as_ref() == payload.as_slice());
}

#[tokio::test]
async fn test_cluster_deployment_end_to_end() {
    let (base_port, listeners) = bind_consecutive(2).await;
    drop(listeners);

    let mut config = GatewayConfig::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.http_port = 0;
    config.server.mode = DeploymentMode::Cluster;
    config.workers.base_port = base_port;
    config.workers.count = 2;
    config.validate().unwrap();

    let deployment = Deployment::from_config(&config, None)
        .unwrap()
        .bind()
        .await
        .unwrap();
    let base_url = format!("http://{}", deployment.frontend_addr());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let serving = tokio::spawn(deployment.serve(shutdown_rx));

    let client = reqwest::Client::new();

    // Handled by the front-end's own collection
    let created = client
        .post(format!("{}/api/users", base_url))
        .json(&json!({ "username": "Ann", "age": 30 }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status().as_u16(), 201);

    // Forwarded to a worker, which has no forwarder and answers 404 itself
    let forwarded = client
        .get(format!("{}/somewhere/else", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(forwarded.status().as_u16(), 404);
    let body: Value = forwarded.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Endpoint not found." }));

    // Workers own separate collections
    let worker_users: Value = client
        .get(format!("http://127.0.0.1:{}/api/users", base_port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(worker_users, json!([]));

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
