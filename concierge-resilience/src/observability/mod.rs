//! Logging and metrics for the resilience layer.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig, LogFormat, LoggingError};
pub use self::metrics::{init_metrics, render_metrics, MetricsError};
