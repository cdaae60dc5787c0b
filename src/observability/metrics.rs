//! # Metrics
//!
//! Counters are recorded with the `metrics` macros wherever the event happens
//! (`gateway_requests_total`, `load_balancer_selections`, ...). Until a recorder is
//! installed those calls are no-ops, which keeps library code and tests free of
//! global setup. The binary installs the Prometheus recorder when the admin listener
//! is enabled, and the admin `/metrics` endpoint renders it.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::core::error::{GatewayError, GatewayResult};

/// Install the global Prometheus recorder and return a handle for rendering
pub fn install_prometheus_recorder() -> GatewayResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| GatewayError::internal(format!("Failed to install metrics recorder: {}", e)))?;

    info!("Prometheus metrics recorder installed");
    Ok(handle)
}
