//! Stream-vs-stream comparison.

use crate::config::{CompareConfig, CoverageBasis};
use crate::verdict::{percentage, Verdict};
use probe_core::{EntityKind, IdentityKey, SourceId};
use probe_feed::SourceSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Partition of `candidate ∪ reference`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub common: BTreeSet<IdentityKey>,
    pub only_candidate: BTreeSet<IdentityKey>,
    pub only_reference: BTreeSet<IdentityKey>,
}

impl Partition {
    pub fn of<'a>(
        candidate: impl IntoIterator<Item = &'a IdentityKey>,
        reference: impl IntoIterator<Item = &'a IdentityKey>,
    ) -> Self {
        let candidate: BTreeSet<IdentityKey> = candidate.into_iter().cloned().collect();
        let reference: BTreeSet<IdentityKey> = reference.into_iter().cloned().collect();
        Self {
            common: candidate.intersection(&reference).cloned().collect(),
            only_candidate: candidate.difference(&reference).cloned().collect(),
            only_reference: reference.difference(&candidate).cloned().collect(),
        }
    }

    pub fn union_len(&self) -> usize {
        self.common.len() + self.only_candidate.len() + self.only_reference.len()
    }

    pub fn candidate_len(&self) -> usize {
        self.common.len() + self.only_candidate.len()
    }

    pub fn reference_len(&self) -> usize {
        self.common.len() + self.only_reference.len()
    }
}

/// Comparison of two sources for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub kind: EntityKind,
    pub candidate: SourceId,
    pub reference: SourceId,
    pub candidate_seen: usize,
    pub reference_seen: usize,
    pub partition: Partition,
    pub basis: CoverageBasis,
    pub coverage_pct: Decimal,
    /// `|common| / |reference| * 100`, reported regardless of basis.
    pub overlap_pct: Decimal,
    pub threshold_pct: Decimal,
    pub verdict: Verdict,
}

/// Compare `candidate` against `reference` for `kind`.
///
/// An empty reference set gives a vacuous 100% (pass). Availability is the
/// report assembler's concern, not this function's.
pub fn compare(
    candidate: &SourceSnapshot,
    reference: &SourceSnapshot,
    kind: EntityKind,
    config: &CompareConfig,
) -> ComparisonResult {
    let partition = Partition::of(
        candidate.accumulator(kind).identities(),
        reference.accumulator(kind).identities(),
    );
    let candidate_seen = partition.candidate_len();
    let reference_seen = partition.reference_len();

    let overlap_pct = percentage(partition.common.len(), reference_seen);
    let coverage_pct = match config.coverage_basis {
        CoverageBasis::SizeRatio => percentage(candidate_seen, reference_seen),
        CoverageBasis::Overlap => overlap_pct,
    };
    let verdict = Verdict::from_coverage(coverage_pct, config.threshold_pct);

    info!(
        %kind,
        candidate = %candidate.source,
        reference = %reference.source,
        candidate_seen,
        reference_seen,
        common = partition.common.len(),
        coverage_pct = %coverage_pct.round_dp(2),
        overlap_pct = %overlap_pct.round_dp(2),
        %verdict,
        "Comparison complete"
    );

    ComparisonResult {
        kind,
        candidate: candidate.source,
        reference: reference.source,
        candidate_seen,
        reference_seen,
        partition,
        basis: config.coverage_basis,
        coverage_pct,
        overlap_pct,
        threshold_pct: config.threshold_pct,
        verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_feed::AccumulatorSnapshot;
    use rust_decimal_macros::dec;

    fn keys(ids: &[&str]) -> AccumulatorSnapshot {
        ids.iter().map(|s| IdentityKey::parse(s).unwrap()).collect()
    }

    fn set(ids: &[&str]) -> BTreeSet<IdentityKey> {
        ids.iter().map(|s| IdentityKey::parse(s).unwrap()).collect()
    }

    fn snapshot(source: SourceId, tokens: &[&str]) -> SourceSnapshot {
        SourceSnapshot::new(source).with_kind(EntityKind::Token, keys(tokens))
    }

    fn config(basis: CoverageBasis) -> CompareConfig {
        CompareConfig {
            coverage_basis: basis,
            ..Default::default()
        }
    }

    #[test]
    fn test_overlap_scenario() {
        let left = snapshot(SourceId::Indexer, &["t1", "t2", "t3"]);
        let right = snapshot(SourceId::Aggregator, &["t2", "t3", "t4"]);

        let result = compare(&left, &right, EntityKind::Token, &config(CoverageBasis::Overlap));
        assert_eq!(result.partition.common, set(&["t2", "t3"]));
        assert_eq!(result.partition.only_candidate, set(&["t1"]));
        assert_eq!(result.partition.only_reference, set(&["t4"]));
        assert_eq!(result.coverage_pct.round_dp(2), dec!(66.67));
        assert_eq!(result.verdict, Verdict::Fail);

        // Same sizes: the size ratio is a full 100%.
        let result = compare(&left, &right, EntityKind::Token, &config(CoverageBasis::SizeRatio));
        assert_eq!(result.coverage_pct, dec!(100));
        assert_eq!(result.overlap_pct.round_dp(2), dec!(66.67));
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let left = snapshot(SourceId::Indexer, &["a", "b", "c", "d"]);
        let right = snapshot(SourceId::Aggregator, &["c", "d", "e"]);
        let result = compare(&left, &right, EntityKind::Token, &CompareConfig::default());
        let p = &result.partition;

        let union: BTreeSet<_> = p
            .common
            .iter()
            .chain(&p.only_candidate)
            .chain(&p.only_reference)
            .cloned()
            .collect();
        assert_eq!(union, set(&["a", "b", "c", "d", "e"]));
        assert_eq!(p.union_len(), union.len());
        assert_eq!(result.candidate_seen, 4);
        assert_eq!(result.reference_seen, 3);
    }

    #[test]
    fn test_threshold_boundary_size_ratio() {
        let reference: Vec<String> = (0..100).map(|i| format!("r{i}")).collect();
        let reference_refs: Vec<&str> = reference.iter().map(String::as_str).collect();
        let right = snapshot(SourceId::Aggregator, &reference_refs);

        let left = snapshot(SourceId::Indexer, &reference_refs[..85]);
        let result = compare(&left, &right, EntityKind::Token, &CompareConfig::default());
        assert_eq!(result.coverage_pct, dec!(85));
        assert_eq!(result.verdict, Verdict::Pass);

        let left = snapshot(SourceId::Indexer, &reference_refs[..84]);
        let result = compare(&left, &right, EntityKind::Token, &CompareConfig::default());
        assert_eq!(result.coverage_pct, dec!(84));
        assert_eq!(result.verdict, Verdict::Fail);
    }

    #[test]
    fn test_empty_reference_is_vacuous_pass() {
        let left = snapshot(SourceId::Indexer, &[]);
        let right = snapshot(SourceId::Aggregator, &[]);
        for basis in [CoverageBasis::SizeRatio, CoverageBasis::Overlap] {
            let result = compare(&left, &right, EntityKind::Token, &config(basis));
            assert_eq!(result.coverage_pct, dec!(100));
            assert_eq!(result.verdict, Verdict::Pass);
        }
    }

    #[test]
    fn test_kinds_compared_independently() {
        let left = snapshot(SourceId::Indexer, &["a"])
            .with_kind(EntityKind::Transaction, keys(&["0x01"]));
        let right = snapshot(SourceId::Aggregator, &["a"])
            .with_kind(EntityKind::Transaction, keys(&["0x01", "0x02", "0x03"]));

        let tokens = compare(&left, &right, EntityKind::Token, &CompareConfig::default());
        let txs = compare(&left, &right, EntityKind::Transaction, &CompareConfig::default());
        assert!(tokens.verdict.is_pass());
        assert_eq!(txs.verdict, Verdict::Fail);
    }
}
