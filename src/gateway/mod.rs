//! Front-end and worker servers, and the per-mode assembly of them.

pub mod deployment;
pub mod server;

pub use deployment::{BoundDeployment, Deployment};
pub use server::{GatewayServer, ServerConfig, ServerState};
