//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Packet and table counters for the router

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{Counter, InterfaceStats, MetricsRegistry};
