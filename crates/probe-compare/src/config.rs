//! Comparison configuration.

use crate::error::{CompareError, CompareResult};
use probe_core::{EntityKind, SourceId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the candidate stream is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    /// Candidate stream vs reference stream.
    Streams,
    /// Candidate stream vs per-identity REST lookups.
    Lookup,
}

impl CompareMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streams => "streams",
            Self::Lookup => "lookup",
        }
    }
}

/// How `coverage_pct` is computed in stream mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageBasis {
    /// `|candidate| / |reference| * 100`.
    SizeRatio,
    /// `|candidate ∩ reference| / |reference| * 100`.
    Overlap,
}

/// Run-level comparison settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareConfig {
    #[serde(default = "default_mode")]
    pub mode: CompareMode,
    /// Source under test.
    #[serde(default = "default_candidate")]
    pub candidate: SourceId,
    /// Source treated as ground truth in stream mode.
    #[serde(default = "default_reference")]
    pub reference: SourceId,
    /// Minimum coverage for a pass (inclusive).
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: Decimal,
    #[serde(default = "default_coverage_basis")]
    pub coverage_basis: CoverageBasis,
    /// Entity kinds whose verdict decides the run status.
    #[serde(default = "default_gated_kinds")]
    pub gated_kinds: Vec<EntityKind>,
}

fn default_mode() -> CompareMode {
    CompareMode::Streams
}

fn default_candidate() -> SourceId {
    SourceId::Indexer
}

fn default_reference() -> SourceId {
    SourceId::Aggregator
}

fn default_threshold_pct() -> Decimal {
    Decimal::from(85)
}

fn default_coverage_basis() -> CoverageBasis {
    CoverageBasis::SizeRatio
}

fn default_gated_kinds() -> Vec<EntityKind> {
    vec![EntityKind::Token]
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            candidate: default_candidate(),
            reference: default_reference(),
            threshold_pct: default_threshold_pct(),
            coverage_basis: default_coverage_basis(),
            gated_kinds: default_gated_kinds(),
        }
    }
}

impl CompareConfig {
    /// Validate role and threshold settings.
    pub fn validate(&self) -> CompareResult<()> {
        if self.threshold_pct.is_sign_negative() || self.threshold_pct > Decimal::from(100) {
            return Err(CompareError::ConfigError(format!(
                "threshold_pct ({}) must be within 0..=100",
                self.threshold_pct
            )));
        }
        if !self.candidate.is_stream() {
            return Err(CompareError::ConfigError(format!(
                "candidate ({}) must be a stream source",
                self.candidate
            )));
        }
        if self.mode == CompareMode::Streams {
            if !self.reference.is_stream() {
                return Err(CompareError::ConfigError(format!(
                    "reference ({}) must be a stream source in streams mode",
                    self.reference
                )));
            }
            if self.candidate == self.reference {
                return Err(CompareError::ConfigError(
                    "candidate and reference must differ".to_string(),
                ));
            }
        }
        if self.gated_kinds.is_empty() {
            return Err(CompareError::ConfigError(
                "gated_kinds must name at least one entity kind".to_string(),
            ));
        }
        Ok(())
    }

    /// Sources that must deliver for a conclusive run.
    pub fn required_sources(&self) -> Vec<SourceId> {
        match self.mode {
            CompareMode::Streams => vec![self.candidate, self.reference],
            CompareMode::Lookup => vec![self.candidate],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_is_valid() {
        let config = CompareConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_pct, dec!(85));
        assert_eq!(
            config.required_sources(),
            vec![SourceId::Indexer, SourceId::Aggregator]
        );
    }

    #[test]
    fn test_invalid_threshold() {
        let config = CompareConfig {
            threshold_pct: dec!(100.5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_roles_rejected_in_streams_mode() {
        let config = CompareConfig {
            reference: SourceId::Indexer,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let lookup = CompareConfig {
            mode: CompareMode::Lookup,
            reference: SourceId::Lookup,
            ..Default::default()
        };
        assert!(lookup.validate().is_ok());
        assert_eq!(lookup.required_sources(), vec![SourceId::Indexer]);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: CompareConfig = serde_json::from_str(
            r#"{"candidate": "aggregator", "reference": "indexer", "threshold_pct": 90, "coverage_basis": "overlap"}"#,
        )
        .unwrap();
        assert_eq!(config.candidate, SourceId::Aggregator);
        assert_eq!(config.threshold_pct, dec!(90));
        assert_eq!(config.coverage_basis, CoverageBasis::Overlap);
        assert_eq!(config.gated_kinds, vec![EntityKind::Token]);
    }
}
