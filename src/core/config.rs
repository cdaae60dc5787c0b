//! # Configuration Module
//!
//! Startup configuration for the gateway. Values come from three layers, applied in
//! order:
//!
//! 1. `GatewayConfig::default()`
//! 2. an optional YAML file named by `GATEWAY_CONFIG_PATH`
//! 3. `GATEWAY_*` environment variable overrides
//!
//! The result is validated once; nothing is reloaded while the process runs.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::{GatewayError, GatewayResult};

/// Environment variable naming an optional YAML configuration file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG_PATH";

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener settings for the front-end and admin servers
    pub server: ServerSettings,

    /// The backend worker pool requests are forwarded to
    pub workers: WorkerPoolConfig,

    /// Log level and output format
    pub logging: LogConfig,
}

/// How this process participates in the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// A single router with no worker pool
    Standalone,
    /// A front-end forwarding to workers started elsewhere
    Balancer,
    /// A front-end plus one in-process worker server per registry port
    Cluster,
}

impl FromStr for DeploymentMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standalone" => Ok(Self::Standalone),
            "balancer" => Ok(Self::Balancer),
            "cluster" | "multi" => Ok(Self::Cluster),
            other => Err(GatewayError::config(format!(
                "Unknown deployment mode '{}', expected standalone, balancer or cluster",
                other
            ))),
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => write!(f, "standalone"),
            Self::Balancer => write!(f, "balancer"),
            Self::Cluster => write!(f, "cluster"),
        }
    }
}

/// Server listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub http_port: u16,
    /// Admin listener port, `0` disables the admin server
    pub admin_port: u16,
    /// Upper bound for buffered `/api/users` request bodies
    pub max_request_size: usize,
    pub mode: DeploymentMode,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 4000,
            admin_port: 0,
            max_request_size: 16 * 1024 * 1024, // 16MB
            mode: DeploymentMode::Standalone,
        }
    }
}

/// Worker pool configuration.
///
/// The registry is `base_port .. base_port + count - 1` on `host`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub host: String,
    pub base_port: u16,
    pub count: usize,
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: 4001,
            count: 4,
            upstream_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            other => Err(GatewayError::config(format!("Unknown log format '{}'", other))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl GatewayConfig {
    /// Load configuration the way the binary does: YAML file if `GATEWAY_CONFIG_PATH`
    /// is set, otherwise defaults, then environment overrides and validation.
    pub async fn load() -> GatewayResult<Self> {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_file(path).await,
            Err(_) => {
                let mut config = Self::default();
                config.apply_env_overrides()?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let mut config = Self::from_yaml_str(&content)?;

        config.apply_env_overrides()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document; fields it leaves out keep their defaults
    pub fn from_yaml_str(content: &str) -> GatewayResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: GATEWAY_<SECTION>_<FIELD>
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        if let Ok(addr) = env::var("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Ok(port) = env::var("GATEWAY_SERVER_HTTP_PORT") {
            self.server.http_port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_SERVER_HTTP_PORT: {}", e)))?;
        }

        if let Ok(port) = env::var("GATEWAY_SERVER_ADMIN_PORT") {
            self.server.admin_port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_SERVER_ADMIN_PORT: {}", e)))?;
        }

        if let Ok(size) = env::var("GATEWAY_SERVER_MAX_REQUEST_SIZE") {
            self.server.max_request_size = size.parse().map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_SERVER_MAX_REQUEST_SIZE: {}", e))
            })?;
        }

        if let Ok(mode) = env::var("GATEWAY_MODE") {
            self.server.mode = mode.parse()?;
        }

        // Worker pool overrides
        if let Ok(host) = env::var("GATEWAY_WORKER_HOST") {
            self.workers.host = host;
        }

        if let Ok(port) = env::var("GATEWAY_WORKER_BASE_PORT") {
            self.workers.base_port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_WORKER_BASE_PORT: {}", e)))?;
        }

        if let Ok(count) = env::var("GATEWAY_WORKER_COUNT") {
            self.workers.count = count
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_WORKER_COUNT: {}", e)))?;
        }

        if let Ok(timeout) = env::var("GATEWAY_UPSTREAM_TIMEOUT") {
            self.workers.upstream_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_UPSTREAM_TIMEOUT: {}", e)))?;
        }

        if let Ok(timeout) = env::var("GATEWAY_CONNECT_TIMEOUT") {
            self.workers.connect_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_CONNECT_TIMEOUT: {}", e)))?;
        }

        // Logging configuration overrides
        if let Ok(level) = env::var("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("GATEWAY_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.server.max_request_size == 0 {
            errors.push("max_request_size must be greater than 0".to_string());
        }

        if self.server.admin_port != 0 && self.server.admin_port == self.server.http_port {
            errors.push("admin_port must differ from http_port".to_string());
        }

        if self.server.mode != DeploymentMode::Standalone {
            if self.workers.count == 0 {
                errors.push("workers.count must be greater than 0".to_string());
            }

            if self.workers.host.is_empty() {
                errors.push("workers.host cannot be empty".to_string());
            }

            if self.workers.upstream_timeout.is_zero() {
                errors.push("workers.upstream_timeout must be greater than 0".to_string());
            }

            let first = self.workers.base_port as usize;
            let last = first + self.workers.count.saturating_sub(1);
            if last > u16::MAX as usize {
                errors.push(format!(
                    "worker ports {}..={} exceed the valid port range",
                    first, last
                ));
            }

            if self.server.mode == DeploymentMode::Cluster {
                let ports = first..=last;
                if ports.contains(&(self.server.http_port as usize)) {
                    errors.push(format!(
                        "http_port {} overlaps the worker ports {}..={}",
                        self.server.http_port, first, last
                    ));
                }
                if self.server.admin_port != 0 && ports.contains(&(self.server.admin_port as usize)) {
                    errors.push(format!(
                        "admin_port {} overlaps the worker ports {}..={}",
                        self.server.admin_port, first, last
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(errors.join("; ")));
        }

        Ok(())
    }
}
