//! # Users Gateway - Main Entry Point
//!
//! Loads configuration, installs logging (and the metrics recorder when the admin
//! listener is enabled), then runs the deployment for the configured mode until
//! SIGINT or SIGTERM.

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use users_gateway::core::config::GatewayConfig;
use users_gateway::observability::{init_logging, install_prometheus_recorder};
use users_gateway::{Deployment, GatewayResult};

#[tokio::main]
async fn main() {
    let config = match GatewayConfig::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    info!("🚀 Starting users gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("Gateway stopped with an error: {}", e);
        std::process::exit(1);
    }

    info!("✅ Users gateway shutdown complete");
}

async fn run(config: GatewayConfig) -> GatewayResult<()> {
    let metrics = if config.server.admin_port != 0 {
        Some(install_prometheus_recorder()?)
    } else {
        None
    };

    info!(
        mode = %config.server.mode,
        http_port = config.server.http_port,
        workers = config.workers.count,
        "📋 Configuration loaded"
    );

    let deployment = Deployment::from_config(&config, metrics)?.bind().await?;

    info!("🌐 Gateway ready on {}", deployment.frontend_addr());
    if let Some(admin_addr) = deployment.admin_addr() {
        info!("⚙️  Admin interface ready on {}", admin_addr);
        info!("📊 Metrics available on {}/metrics", admin_addr);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutdown signal received, draining in-flight requests...");
        let _ = shutdown_tx.send(true);
    });

    deployment.serve(shutdown_rx).await
}

/// Wait for SIGTERM or SIGINT (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("📡 Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("📡 Received SIGTERM"),
    }
}
