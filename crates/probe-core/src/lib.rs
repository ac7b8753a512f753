//! Core domain types for the token coverage probe.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `SourceId`, `EntityKind`: which feed produced an observation and what it describes
//! - `IdentityKey`, `NetworkKey`: canonical dedup and chain identities
//! - `Observation`: the normalized unit admitted into a collection window
//! - `IdentityFilter`: the admission gate for the tracked token population

pub mod error;
pub mod filter;
pub mod identity;
pub mod types;

pub use error::{CoreError, Result};
pub use filter::{IdentityFilter, TrackingConfig};
pub use identity::{IdentityKey, NetworkKey};
pub use types::{EntityKind, Measures, Observation, RawEvent, SourceId, TradeSide};
