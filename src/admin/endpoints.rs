//! # Admin Endpoints
//!
//! Served on a separate listener so none of these paths can shadow a route that
//! should be forwarded to a worker.
//!
//! - `GET  /health`                      liveness
//! - `GET  /ready`                       readiness plus deployment summary
//! - `GET  /metrics`                     Prometheus text, when a recorder is installed
//! - `GET  /admin/balancer/stats`        round-robin statistics
//! - `POST /admin/balancer/stats/reset`  rewind the cursor and clear statistics

use crate::core::config::DeploymentMode;
use crate::load_balancing::{LoadBalancer, LoadBalancerStats};
use crate::store::UserStore;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Admin router state
#[derive(Clone)]
pub struct AdminState {
    pub mode: DeploymentMode,
    /// Present on nodes that forward to a worker pool
    pub balancer: Option<Arc<dyn LoadBalancer>>,
    /// The front-end node's own users collection
    pub store: Arc<UserStore>,
    pub metrics: Option<PrometheusHandle>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Admin router
pub struct AdminRouter;

impl AdminRouter {
    /// Create the admin router with all endpoints
    pub fn create_router(state: AdminState) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(render_metrics))
            .route("/admin/balancer/stats", get(get_balancer_stats))
            .route("/admin/balancer/stats/reset", post(reset_balancer_stats))
            .with_state(state)
    }
}

/// Health check handler
async fn health_check() -> impl IntoResponse {
    let health_info = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    (StatusCode::OK, Json(health_info))
}

/// Readiness check handler
async fn readiness_check(State(state): State<AdminState>) -> impl IntoResponse {
    let next_worker = state
        .balancer
        .as_ref()
        .map(|balancer| balancer.stats().next_worker);

    let readiness_info = json!({
        "status": "ready",
        "mode": state.mode.to_string(),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_seconds": (chrono::Utc::now() - state.started_at).num_seconds(),
        "users": state.store.len(),
        "forwarding": state.balancer.is_some(),
        "next_worker": next_worker,
    });

    (StatusCode::OK, Json(readiness_info))
}

async fn render_metrics(State(state): State<AdminState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Metrics recorder not installed" })),
        )
            .into_response(),
    }
}

async fn get_balancer_stats(
    State(state): State<AdminState>,
) -> Result<Json<LoadBalancerStats>, (StatusCode, Json<serde_json::Value>)> {
    match &state.balancer {
        Some(balancer) => Ok(Json(balancer.stats())),
        None => Err(no_balancer()),
    }
}

async fn reset_balancer_stats(
    State(state): State<AdminState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let balancer = state.balancer.as_ref().ok_or_else(no_balancer)?;
    balancer.reset();
    info!(algorithm = balancer.algorithm_name(), "Load balancer statistics reset");

    Ok(Json(json!({
        "success": true,
        "algorithm": balancer.algorithm_name(),
    })))
}

fn no_balancer() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "This node does not forward to a worker pool" })),
    )
}
