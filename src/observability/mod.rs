pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use self::metrics::install_prometheus_recorder;
