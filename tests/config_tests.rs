//! # Configuration Loading Tests
//!
//! YAML files written to temporary paths and loaded the way the binary loads them.

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use users_gateway::core::config::{DeploymentMode, GatewayConfig, LogFormat};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_load_shipped_config() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/gateway.yaml");
    let config = GatewayConfig::load_from_file(path).await.unwrap();

    assert_eq!(config.server.mode, DeploymentMode::Cluster);
    assert_eq!(config.server.admin_port, 9090);
    assert_eq!(config.workers.count, 4);
    assert_eq!(config.workers.connect_timeout, Duration::from_secs(5));
}

#[tokio::test]
async fn test_load_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
server:
  mode: balancer
workers:
  host: "10.0.0.5"
  upstream_timeout: 2s
logging:
  format: text
"#,
    );

    let config = GatewayConfig::load_from_file(file.path()).await.unwrap();

    assert_eq!(config.server.mode, DeploymentMode::Balancer);
    assert_eq!(config.server.http_port, 4000);
    assert_eq!(config.workers.host, "10.0.0.5");
    assert_eq!(config.workers.base_port, 4001);
    assert_eq!(config.workers.upstream_timeout, Duration::from_secs(2));
    assert_eq!(config.logging.format, LogFormat::Text);
}

#[tokio::test]
async fn test_load_rejects_invalid_values() {
    let file = write_config(
        r#"
server:
  mode: cluster
  http_port: 4001
workers:
  base_port: 4001
  count: 2
"#,
    );

    let error = GatewayConfig::load_from_file(file.path()).await.unwrap_err();
    assert!(error.to_string().contains("overlaps the worker ports"));
}

#[tokio::test]
async fn test_load_rejects_unknown_mode() {
    let file = write_config("server:\n  mode: sideways\n");

    let error = GatewayConfig::load_from_file(file.path()).await.unwrap_err();
    assert!(error.to_string().contains("Failed to parse config"));
}
