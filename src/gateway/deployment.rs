//! # Deployment
//!
//! Assembles the servers one process runs for a [`DeploymentMode`]:
//!
//! - `standalone`: the front-end alone. Nothing is forwarded; unmatched requests get
//!   `404 {"error":"Endpoint not found."}`.
//! - `balancer`: the front-end plus a [`ProxyForwarder`] over the worker registry.
//!   The workers are expected to be running elsewhere.
//! - `cluster`: as `balancer`, and this process also runs one worker server per
//!   registry port. Each worker owns a separate users collection and has no
//!   forwarder of its own, so a request that reaches a worker is never relayed again.
//!
//! Optionally an admin listener runs beside the front-end. All listeners are bound
//! before any of them starts serving, so a port conflict fails startup as a whole.

use crate::admin::{AdminRouter, AdminState};
use crate::core::config::{DeploymentMode, GatewayConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::gateway::server::{GatewayServer, ServerConfig};
use crate::load_balancing::{LoadBalancer, RoundRobinBalancer, WorkerRegistry};
use crate::proxy::ProxyForwarder;
use crate::store::UserStore;
use axum::Router as AxumRouter;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Every server a process runs, not yet bound
pub struct Deployment {
    mode: DeploymentMode,
    frontend: GatewayServer,
    workers: Vec<GatewayServer>,
    admin: Option<(SocketAddr, AxumRouter)>,
}

impl Deployment {
    /// Build the servers for the configured mode
    pub fn from_config(config: &GatewayConfig, metrics: Option<PrometheusHandle>) -> GatewayResult<Self> {
        let mode = config.server.mode;
        let frontend_addr = socket_addr(&config.server.bind_address, config.server.http_port)?;

        let registry = match mode {
            DeploymentMode::Standalone => None,
            DeploymentMode::Balancer | DeploymentMode::Cluster => Some(Arc::new(WorkerRegistry::build(
                &config.workers.host,
                config.workers.base_port,
                config.workers.count,
            )?)),
        };

        let balancer = registry.clone().map(|registry| {
            Arc::new(RoundRobinBalancer::new(registry)) as Arc<dyn LoadBalancer>
        });

        let forwarder = balancer
            .clone()
            .map(|balancer| ProxyForwarder::new(balancer, &config.workers).map(Arc::new))
            .transpose()?;

        let store = Arc::new(UserStore::new());
        let frontend = GatewayServer::new(
            ServerConfig {
                name: "gateway".to_string(),
                bind_addr: frontend_addr,
                max_body_size: config.server.max_request_size,
            },
            store.clone(),
            forwarder,
        )?;

        let mut workers = Vec::new();
        if let (DeploymentMode::Cluster, Some(registry)) = (mode, &registry) {
            for port in registry.ports() {
                workers.push(GatewayServer::new(
                    ServerConfig {
                        name: format!("worker-{}", port),
                        bind_addr: socket_addr(&config.server.bind_address, port)?,
                        max_body_size: config.server.max_request_size,
                    },
                    Arc::new(UserStore::new()),
                    None,
                )?);
            }
        }

        let admin = if config.server.admin_port != 0 {
            let addr = socket_addr(&config.server.bind_address, config.server.admin_port)?;
            let router = AdminRouter::create_router(AdminState {
                mode,
                balancer,
                store,
                metrics,
                started_at: chrono::Utc::now(),
            });
            Some((addr, router))
        } else {
            None
        };

        Ok(Self {
            mode,
            frontend,
            workers,
            admin,
        })
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn frontend(&self) -> &GatewayServer {
        &self.frontend
    }

    pub fn workers(&self) -> &[GatewayServer] {
        &self.workers
    }

    /// Bind every listener. Fails without serving anything if one port is taken.
    pub async fn bind(self) -> GatewayResult<BoundDeployment> {
        let mut workers = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            let listener = worker.bind().await?;
            workers.push((worker, listener));
        }

        let frontend_listener = self.frontend.bind().await?;
        let frontend_addr = frontend_listener.local_addr()?;

        let admin = match self.admin {
            Some((addr, router)) => {
                let listener = TcpListener::bind(addr).await.map_err(|e| {
                    GatewayError::internal(format!("Failed to bind admin server to {}: {}", addr, e))
                })?;
                Some((listener, router))
            }
            None => None,
        };
        let admin_addr = admin
            .as_ref()
            .map(|(listener, _)| listener.local_addr())
            .transpose()?;

        Ok(BoundDeployment {
            mode: self.mode,
            frontend: (self.frontend, frontend_listener),
            frontend_addr,
            workers,
            admin,
            admin_addr,
        })
    }
}

/// A deployment whose listeners are bound and ready to serve
pub struct BoundDeployment {
    mode: DeploymentMode,
    frontend: (GatewayServer, TcpListener),
    frontend_addr: SocketAddr,
    workers: Vec<(GatewayServer, TcpListener)>,
    admin: Option<(TcpListener, AxumRouter)>,
    admin_addr: Option<SocketAddr>,
}

impl BoundDeployment {
    /// Address the front-end actually listens on
    pub fn frontend_addr(&self) -> SocketAddr {
        self.frontend_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// Serve every listener until `shutdown` flips to `true`. Returns the first
    /// server error, if any.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> GatewayResult<()> {
        info!(
            mode = %self.mode,
            frontend = %self.frontend_addr,
            workers = self.workers.len(),
            admin = ?self.admin_addr,
            "Deployment starting"
        );

        let mut servers = JoinSet::new();

        for (worker, listener) in self.workers {
            servers.spawn(worker.serve(listener, wait_for_shutdown(shutdown.clone())));
        }

        let (frontend, listener) = self.frontend;
        servers.spawn(frontend.serve(listener, wait_for_shutdown(shutdown.clone())));

        if let Some((listener, router)) = self.admin {
            let signal = wait_for_shutdown(shutdown.clone());
            servers.spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(signal)
                    .await
                    .map_err(|e| GatewayError::internal(format!("admin server error: {}", e)))
            });
        }

        let mut first_error = None;
        while let Some(joined) = servers.join_next().await {
            let result = joined
                .map_err(|e| GatewayError::internal(format!("server task failed: {}", e)))
                .and_then(|served| served);

            if let Err(e) = result {
                error!(error = %e, "Server stopped with an error");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Resolves once the watch channel reads `true` or its sender is gone
fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    }
}

fn socket_addr(host: &str, port: u16) -> GatewayResult<SocketAddr> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| GatewayError::config(format!("Invalid bind address {}:{}: {}", host, port, e)))
}
