//! Observation normalization and windowed collection.
//!
//! - `Normalizer`: per-feed shape-sniffing into `Observation`s
//! - `Collector`: the collection window state machine and per-source accumulators
//! - `FeedPump`: glue between one adapter channel and the collector

pub mod accumulator;
pub mod collector;
pub mod error;
pub mod normalizer;
pub mod pump;
pub mod snapshot;

pub use accumulator::{AccumulatorSnapshot, FirstSeen, SourceAccumulator};
pub use collector::{Admission, Collector, WindowPhase};
pub use error::{FeedError, FeedResult};
pub use normalizer::{AggregatorNormalizer, IndexerNormalizer, Normalized, Normalizer};
pub use pump::{FeedPump, PumpStats};
pub use snapshot::{SourceSnapshot, SourceStatus, WindowSnapshot};
