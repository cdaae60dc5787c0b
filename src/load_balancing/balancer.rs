//! # Load Balancer Module
//!
//! Worker selection for the proxy branch of the router. The only strategy is a plain
//! round-robin cursor over the [`WorkerRegistry`]: no health tracking, no retries and
//! no weights.
//!
//! The cursor is shared by every in-flight request on a multi-threaded runtime, so
//! reading the current worker and advancing to the next one happen in a single
//! `fetch_update` on an `AtomicUsize`. Two concurrent callers can never observe the
//! same pre-advance position.

use crate::core::types::WorkerAddress;
use crate::load_balancing::registry::WorkerRegistry;
use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Interface the forwarder uses to pick a worker.
pub trait LoadBalancer: Send + Sync {
    /// Select the next worker. The pool is never empty, so this cannot fail.
    fn select(&self) -> WorkerAddress;

    /// Get the algorithm name for metrics and logging
    fn algorithm_name(&self) -> &'static str;

    /// Get current statistics for this load balancer
    fn stats(&self) -> LoadBalancerStats;

    /// Move the cursor back to the first worker and clear statistics
    fn reset(&self);
}

/// Load balancer statistics for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancerStats {
    pub algorithm: String,
    pub total_selections: u64,
    /// Port of the worker the next selection will return
    pub next_worker: u16,
    pub instance_stats: HashMap<String, InstanceStats>,
}

/// Per-worker statistics
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStats {
    pub selections: u64,
    pub last_selected: Option<chrono::DateTime<chrono::Utc>>,
}

/// Round-robin balancer over a fixed worker registry
pub struct RoundRobinBalancer {
    registry: Arc<WorkerRegistry>,
    cursor: AtomicUsize,
    total_selections: AtomicU64,
    stats: DashMap<u16, InstanceStats>,
}

impl RoundRobinBalancer {
    /// Create a balancer whose first selection is the first registry entry
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            registry,
            cursor: AtomicUsize::new(0),
            total_selections: AtomicU64::new(0),
            stats: DashMap::new(),
        }
    }

    /// Key of the worker the next call to `select` will return
    pub fn cursor(&self) -> u16 {
        let index = self.cursor.load(Ordering::Acquire);
        self.registry.workers()[index].port
    }

    /// Read the cursor and advance it in one atomic step, returning the old position
    fn advance(&self) -> usize {
        let len = self.registry.len();
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + 1) % len)
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    fn update_stats(&self, port: u16) {
        let mut stats = self.stats.entry(port).or_insert_with(|| InstanceStats {
            selections: 0,
            last_selected: None,
        });
        stats.selections += 1;
        stats.last_selected = Some(chrono::Utc::now());
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(&self) -> WorkerAddress {
        let index = self.advance();
        let selected = self.registry.workers()[index].clone();

        self.total_selections.fetch_add(1, Ordering::Relaxed);
        self.update_stats(selected.port);
        counter!("load_balancer_selections", "worker" => selected.port.to_string()).increment(1);

        debug!(
            worker = %selected,
            position = index,
            algorithm = "round_robin",
            "Selected worker"
        );

        selected
    }

    fn algorithm_name(&self) -> &'static str {
        "round_robin"
    }

    fn stats(&self) -> LoadBalancerStats {
        let instance_stats = self
            .stats
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().clone()))
            .collect();

        LoadBalancerStats {
            algorithm: self.algorithm_name().to_string(),
            total_selections: self.total_selections.load(Ordering::Relaxed),
            next_worker: self.cursor(),
            instance_stats,
        }
    }

    fn reset(&self) {
        self.cursor.store(0, Ordering::Release);
        self.total_selections.store(0, Ordering::Relaxed);
        self.stats.clear();
    }
}
