//! Reference lookups against a REST service.
//!
//! `ReferenceLookup` is the seam the comparator uses; `RestLookupClient` is the
//! production implementation. `Ok(None)` means "not found", `Err` means the
//! answer is unknown.

pub mod client;
pub mod config;
pub mod error;
pub mod lookup;

pub use client::RestLookupClient;
pub use config::LookupConfig;
pub use error::{LookupError, LookupResult};
#[cfg(any(test, feature = "mock"))]
pub use lookup::MockReferenceLookup;
pub use lookup::{EntityRecord, ReferenceLookup};
