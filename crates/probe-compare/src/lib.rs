//! Cross-source coverage comparison.
//!
//! Takes a closed collection window and produces the run verdict:
//! - `compare`: candidate vs reference stream, per entity kind
//! - `compare_with_lookup`: candidate stream vs per-identity REST lookups
//! - `ReportAssembler`: availability rules, gated status, and the final `ProbeReport`

pub mod comparator;
pub mod config;
pub mod error;
pub mod lookup_compare;
pub mod report;
pub mod verdict;

pub use comparator::{compare, ComparisonResult, Partition};
pub use config::{CompareConfig, CompareMode, CoverageBasis};
pub use error::{CompareError, CompareResult};
pub use lookup_compare::{compare_with_lookup, LookupCompareConfig, LookupComparison, LookupOutcome};
pub use report::{ProbeReport, ReportAssembler, RunStatus, SourceReport};
pub use verdict::{percentage, Verdict};
