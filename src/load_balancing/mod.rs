pub mod balancer;
pub mod registry;

pub use balancer::{LoadBalancer, LoadBalancerStats, RoundRobinBalancer};
pub use registry::WorkerRegistry;
