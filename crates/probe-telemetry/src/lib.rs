//! Prometheus metrics and structured logging for the coverage probe.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus counters for admissions, drops and transport failures
//! - Gauges for the coverage result of the last run

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with, DEFAULT_FILTER};
pub use metrics::Metrics;
