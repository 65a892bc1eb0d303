//! Prometheus metrics and structured logging for the menu ticker.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus counters for every absorbed error class and the store size

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
