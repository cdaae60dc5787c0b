//! # Worker Registry
//!
//! The fixed pool of backend workers. It is built once at startup from a base port and
//! a worker count and never changes afterwards, so it can be shared behind an `Arc`
//! without any locking.

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::WorkerAddress;
use tracing::info;

/// Ordered, non-empty set of workers keyed by port.
///
/// Ports are unique and contiguous: `base_port, base_port + 1, .. base_port + count - 1`.
#[derive(Debug, Clone)]
pub struct WorkerRegistry {
    workers: Vec<WorkerAddress>,
}

impl WorkerRegistry {
    /// Build the registry for `count` workers on `host` starting at `base_port`.
    ///
    /// Fails when `count` is zero or when the last port would not fit in a `u16`.
    pub fn build<S: Into<String>>(host: S, base_port: u16, count: usize) -> GatewayResult<Self> {
        if count == 0 {
            return Err(GatewayError::config("worker count must be greater than 0"));
        }

        let last = base_port as usize + count - 1;
        if last > u16::MAX as usize {
            return Err(GatewayError::config(format!(
                "worker ports {}..={} exceed the valid port range",
                base_port, last
            )));
        }

        let host = host.into();
        let workers: Vec<WorkerAddress> = (base_port as usize..=last)
            .map(|port| WorkerAddress::new(host.clone(), port as u16))
            .collect();

        info!(
            host = %host,
            first_port = base_port,
            last_port = last,
            count = workers.len(),
            "Worker registry built"
        );

        Ok(Self { workers })
    }

    pub fn workers(&self) -> &[WorkerAddress] {
        &self.workers
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.workers.iter().map(|worker| worker.port)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Always `false`; construction rejects an empty pool
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
