//! Token coverage probe: application driver.
//!
//! Wires the transport adapters, collection window and comparator into one
//! bounded run that ends in a `ProbeReport` and a process exit code.

pub mod app;
pub mod config;
pub mod error;
pub mod render;

pub use app::{exit_code, Application, EXIT_ERROR};
pub use config::{AppConfig, SourceConfig, SourcesConfig, WindowConfig};
pub use error::{AppError, AppResult};
