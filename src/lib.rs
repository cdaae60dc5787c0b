//! # Users Gateway - Core Library Crate
//!
//! An HTTP front-end that serves a small in-memory users API under `/api/users` and
//! forwards every other request, round-robin, to a pool of backend workers.
//!
//! ## Request flow
//!
//! 1. [`gateway::server`] accepts the connection and hands the request to its single
//!    fallback handler.
//! 2. [`routing`] matches method and path against the users dispatch table.
//! 3. A users operation runs against the node's [`store::UserStore`]; anything else
//!    goes to the [`proxy::ProxyForwarder`], which asks the
//!    [`load_balancing::RoundRobinBalancer`] for the next worker.
//!
//! [`gateway::deployment`] wires these together for the three deployment modes
//! (standalone, balancer, cluster) and [`admin`] exposes health, metrics and balancer
//! statistics on a separate listener.

/// Error types, configuration and the data structures shared by every module
pub mod core;

/// The axum servers and the per-mode deployment assembly
pub mod gateway;

/// Worker registry and round-robin selection
pub mod load_balancing;

/// Logging and metrics setup
pub mod observability;

/// Relaying requests to workers
pub mod proxy;

/// Method and path dispatch for the users API
pub mod routing;

/// The in-memory users collection and payload validation
pub mod store;

/// Health, readiness, metrics and balancer statistics endpoints
pub mod admin;

/// Main error type used throughout the gateway
pub use core::error::{GatewayError, GatewayResult};

/// Main configuration structure for the gateway
pub use core::config::{DeploymentMode, GatewayConfig};

pub use core::types::{UserRecord, WorkerAddress};

pub use routing::router::{RouteAction, Router};

/// Server configuration and main server struct
pub use gateway::server::{GatewayServer, ServerConfig};
pub use gateway::deployment::Deployment;
