//! # Core Types
//!
//! Plain data shared between the store, the load balancer and the HTTP layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Network address of one backend worker.
///
/// Workers are identified by their port; the registry uses it as the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerAddress {
    pub host: String,
    pub port: u16,
}

impl WorkerAddress {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL used to build outbound requests, without a trailing slash
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for WorkerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A user record served by the `/api/users` routes.
///
/// `age` keeps the JSON number exactly as the client sent it so `30` is echoed back
/// as `30`, not `30.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub age: serde_json::Number,
    pub hobbies: Vec<String>,
}
