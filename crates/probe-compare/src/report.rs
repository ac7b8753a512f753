//! Report assembly.
//!
//! Packages per-source diagnostics and comparison results into a
//! `ProbeReport` and decides the run status:
//! - `Inconclusive` when a required source was unavailable or admitted nothing
//! - otherwise `Fail` if any gated entity kind failed, else `Pass`

use crate::comparator::{compare, ComparisonResult};
use crate::config::{CompareConfig, CompareMode, CoverageBasis};
use crate::error::{CompareError, CompareResult};
use crate::lookup_compare::LookupComparison;
use crate::verdict::Verdict;
use chrono::{DateTime, Utc};
use probe_core::{EntityKind, SourceId};
use probe_feed::{SourceSnapshot, WindowSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pass,
    Fail,
    /// Not enough data to judge.
    Inconclusive,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Inconclusive => "inconclusive",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// Per-source row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: SourceId,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
    pub tokens_seen: usize,
    pub transactions_seen: usize,
    pub admitted: u64,
    pub filtered_out: u64,
    pub decode_failures: u64,
    pub normalization_skips: u64,
    pub pre_ack_dropped: u64,
    pub late_dropped: u64,
    pub buys: u64,
    pub sells: u64,
    pub event_types: BTreeMap<String, u64>,
    pub volume_usd: Decimal,
}

impl From<&SourceSnapshot> for SourceReport {
    fn from(snap: &SourceSnapshot) -> Self {
        let mut event_types = snap.tokens.event_types.clone();
        for (label, count) in &snap.transactions.event_types {
            *event_types.entry(label.clone()).or_default() += count;
        }
        Self {
            source: snap.source,
            available: snap.is_available(),
            unavailable_reason: snap.unavailable_reason().map(str::to_string),
            tokens_seen: snap.tokens.len(),
            transactions_seen: snap.transactions.len(),
            admitted: snap.admitted(),
            filtered_out: snap.filtered_out,
            decode_failures: snap.decode_failures,
            normalization_skips: snap.normalization_skips,
            pre_ack_dropped: snap.pre_ack_dropped,
            late_dropped: snap.late_dropped,
            buys: snap.tokens.buys + snap.transactions.buys,
            sells: snap.tokens.sells + snap.transactions.sells,
            event_types,
            volume_usd: snap.transactions.volume_usd,
        }
    }
}

/// Final output of one probe run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window_opened_at: DateTime<Utc>,
    pub window_closed_at: DateTime<Utc>,
    pub window_ms: u64,
    pub mode: CompareMode,
    pub candidate: SourceId,
    /// Reference stream; absent in lookup mode.
    pub reference: Option<SourceId>,
    pub threshold_pct: Decimal,
    pub coverage_basis: CoverageBasis,
    pub gated_kinds: Vec<EntityKind>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    pub sources: Vec<SourceReport>,
    pub comparisons: Vec<ComparisonResult>,
    pub lookups: Vec<LookupComparison>,
}

impl ProbeReport {
    pub fn comparison(&self, kind: EntityKind) -> Option<&ComparisonResult> {
        self.comparisons.iter().find(|c| c.kind == kind)
    }

    pub fn lookup(&self, kind: EntityKind) -> Option<&LookupComparison> {
        self.lookups.iter().find(|l| l.kind == kind)
    }

    pub fn source(&self, source: SourceId) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == source)
    }
}

/// Builds reports for one run configuration.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    config: CompareConfig,
}

impl ReportAssembler {
    pub fn new(config: CompareConfig) -> CompareResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Compare candidate and reference streams for every entity kind.
    ///
    /// Returns nothing in lookup mode.
    pub fn compare_streams(&self, snapshot: &WindowSnapshot) -> CompareResult<Vec<ComparisonResult>> {
        if self.config.mode != CompareMode::Streams {
            return Ok(Vec::new());
        }
        let candidate = self.required(snapshot, self.config.candidate)?;
        let reference = self.required(snapshot, self.config.reference)?;
        Ok(EntityKind::ALL
            .iter()
            .map(|kind| compare(candidate, reference, *kind, &self.config))
            .collect())
    }

    /// Assemble the report.
    ///
    /// Fails only when every stream source was unavailable, or when a
    /// configured role names a source the window never registered.
    pub fn assemble(
        &self,
        snapshot: &WindowSnapshot,
        streams: Vec<ComparisonResult>,
        lookups: Vec<LookupComparison>,
    ) -> CompareResult<ProbeReport> {
        if snapshot.stream_sources().all(|s| !s.is_available()) {
            warn!("Every stream source was unavailable");
            return Err(CompareError::AllSourcesUnavailable);
        }

        let (status, status_reason) = match self.inconclusive_reason(snapshot)? {
            Some(reason) => (RunStatus::Inconclusive, Some(reason)),
            None => self.gated_status(&streams, &lookups),
        };

        let report = ProbeReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            window_opened_at: snapshot.opened_at,
            window_closed_at: snapshot.closed_at,
            window_ms: snapshot.duration_ms,
            mode: self.config.mode,
            candidate: self.config.candidate,
            reference: match self.config.mode {
                CompareMode::Streams => Some(self.config.reference),
                CompareMode::Lookup => None,
            },
            threshold_pct: self.config.threshold_pct,
            coverage_basis: self.config.coverage_basis,
            gated_kinds: self.config.gated_kinds.clone(),
            status,
            status_reason,
            sources: snapshot.sources.values().map(SourceReport::from).collect(),
            comparisons: streams,
            lookups,
        };

        info!(
            run_id = %report.run_id,
            status = %report.status,
            reason = report.status_reason.as_deref().unwrap_or(""),
            "Report assembled"
        );
        Ok(report)
    }

    fn required<'a>(
        &self,
        snapshot: &'a WindowSnapshot,
        source: SourceId,
    ) -> CompareResult<&'a SourceSnapshot> {
        snapshot
            .source(source)
            .ok_or(CompareError::MissingSource(source))
    }

    fn inconclusive_reason(&self, snapshot: &WindowSnapshot) -> CompareResult<Option<String>> {
        for source in self.config.required_sources() {
            let snap = self.required(snapshot, source)?;
            if let Some(reason) = snap.unavailable_reason() {
                return Ok(Some(format!("{source} unavailable: {reason}")));
            }
            if snap.admitted() == 0 {
                return Ok(Some(format!("{source} admitted no observations")));
            }
        }
        Ok(None)
    }

    fn gated_status(
        &self,
        streams: &[ComparisonResult],
        lookups: &[LookupComparison],
    ) -> (RunStatus, Option<String>) {
        let gated: Vec<(EntityKind, Verdict)> = match self.config.mode {
            CompareMode::Streams => streams
                .iter()
                .filter(|c| self.config.gated_kinds.contains(&c.kind))
                .map(|c| (c.kind, c.verdict))
                .collect(),
            CompareMode::Lookup => lookups
                .iter()
                .filter(|l| self.config.gated_kinds.contains(&l.kind))
                .map(|l| (l.kind, l.verdict))
                .collect(),
        };

        if gated.is_empty() {
            return (
                RunStatus::Inconclusive,
                Some("no comparison for the gated kinds".to_string()),
            );
        }
        let failed: Vec<&str> = gated
            .iter()
            .filter(|(_, verdict)| !verdict.is_pass())
            .map(|(kind, _)| kind.as_str())
            .collect();
        if failed.is_empty() {
            (RunStatus::Pass, None)
        } else {
            (
                RunStatus::Fail,
                Some(format!("coverage below threshold for {}", failed.join(", "))),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup_compare::{compare_with_lookup, LookupCompareConfig};
    use probe_core::IdentityKey;
    use probe_feed::{AccumulatorSnapshot, SourceStatus};
    use probe_lookup::{EntityRecord, MockReferenceLookup};

    fn tokens(ids: &[&str]) -> AccumulatorSnapshot {
        ids.iter().map(|s| IdentityKey::parse(s).unwrap()).collect()
    }

    fn source(source: SourceId, ids: &[&str]) -> SourceSnapshot {
        SourceSnapshot::new(source).with_kind(EntityKind::Token, tokens(ids))
    }

    fn unavailable(source: SourceId, reason: &str) -> SourceSnapshot {
        let mut snap = SourceSnapshot::new(source);
        snap.status = SourceStatus::Unavailable {
            reason: reason.to_string(),
        };
        snap
    }

    fn window(sources: Vec<SourceSnapshot>) -> WindowSnapshot {
        let now = Utc::now();
        WindowSnapshot {
            opened_at: now,
            closed_at: now,
            duration_ms: 60_000,
            sources: sources.into_iter().map(|s| (s.source, s)).collect(),
        }
    }

    fn run(snapshot: &WindowSnapshot, config: CompareConfig) -> CompareResult<ProbeReport> {
        let assembler = ReportAssembler::new(config)?;
        let streams = assembler.compare_streams(snapshot)?;
        assembler.assemble(snapshot, streams, Vec::new())
    }

    #[test]
    fn test_pass_and_fail() {
        let pass = window(vec![
            source(SourceId::Indexer, &["a", "b", "c"]),
            source(SourceId::Aggregator, &["a", "b", "c"]),
        ]);
        let report = run(&pass, CompareConfig::default()).unwrap();
        assert_eq!(report.status, RunStatus::Pass);
        assert!(report.status_reason.is_none());
        assert_eq!(report.comparisons.len(), 2);
        assert_eq!(report.reference, Some(SourceId::Aggregator));

        let fail = window(vec![
            source(SourceId::Indexer, &["a"]),
            source(SourceId::Aggregator, &["a", "b", "c"]),
        ]);
        let report = run(&fail, CompareConfig::default()).unwrap();
        assert_eq!(report.status, RunStatus::Fail);
        assert!(report.status_reason.unwrap().contains("token"));
    }

    #[test]
    fn test_ungated_kind_does_not_decide() {
        let snapshot = window(vec![
            source(SourceId::Indexer, &["a"]).with_kind(EntityKind::Transaction, tokens(&[])),
            source(SourceId::Aggregator, &["a"])
                .with_kind(EntityKind::Transaction, tokens(&["0x1", "0x2"])),
        ]);
        let report = run(&snapshot, CompareConfig::default()).unwrap();
        assert_eq!(report.status, RunStatus::Pass);
        assert_eq!(
            report.comparison(EntityKind::Transaction).unwrap().verdict,
            Verdict::Fail
        );

        let gated_both = CompareConfig {
            gated_kinds: EntityKind::ALL.to_vec(),
            ..Default::default()
        };
        assert_eq!(run(&snapshot, gated_both).unwrap().status, RunStatus::Fail);
    }

    #[test]
    fn test_unavailable_required_source_is_inconclusive() {
        let snapshot = window(vec![
            source(SourceId::Indexer, &["a", "b"]),
            unavailable(SourceId::Aggregator, "connection refused"),
        ]);
        let report = run(&snapshot, CompareConfig::default()).unwrap();
        assert_eq!(report.status, RunStatus::Inconclusive);
        assert!(report
            .status_reason
            .as_deref()
            .unwrap()
            .contains("aggregator unavailable: connection refused"));
        let row = report.source(SourceId::Aggregator).unwrap();
        assert!(!row.available);
        assert_eq!(row.unavailable_reason.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_zero_observations_is_inconclusive() {
        let snapshot = window(vec![
            source(SourceId::Indexer, &[]),
            source(SourceId::Aggregator, &[]),
        ]);
        let report = run(&snapshot, CompareConfig::default()).unwrap();
        assert_eq!(report.status, RunStatus::Inconclusive);
        // The comparator itself still reports the vacuous pass.
        assert!(report.comparison(EntityKind::Token).unwrap().verdict.is_pass());
    }

    #[test]
    fn test_all_sources_unavailable_is_error() {
        let snapshot = window(vec![
            unavailable(SourceId::Indexer, "timeout"),
            unavailable(SourceId::Aggregator, "refused"),
        ]);
        assert!(matches!(
            run(&snapshot, CompareConfig::default()),
            Err(CompareError::AllSourcesUnavailable)
        ));
    }

    #[test]
    fn test_missing_role_source_is_error() {
        let snapshot = window(vec![source(SourceId::Indexer, &["a"])]);
        assert!(matches!(
            run(&snapshot, CompareConfig::default()),
            Err(CompareError::MissingSource(SourceId::Aggregator))
        ));
    }

    #[tokio::test]
    async fn test_lookup_mode_only_requires_candidate() {
        let snapshot = window(vec![
            source(SourceId::Indexer, &["a", "b"]),
            unavailable(SourceId::Aggregator, "not configured"),
        ]);
        let config = CompareConfig {
            mode: CompareMode::Lookup,
            ..Default::default()
        };
        let assembler = ReportAssembler::new(config).unwrap();
        assert!(assembler.compare_streams(&snapshot).unwrap().is_empty());

        let mut mock = MockReferenceLookup::new();
        mock.expect_lookup()
            .returning(|id| Ok(Some(EntityRecord::new(id.clone()))));
        let candidate = snapshot.source(SourceId::Indexer).unwrap();
        let lookup = compare_with_lookup(
            candidate,
            EntityKind::Token,
            &mock,
            &LookupCompareConfig::default(),
        )
        .await;

        let report = assembler.assemble(&snapshot, Vec::new(), vec![lookup]).unwrap();
        assert_eq!(report.status, RunStatus::Pass);
        assert_eq!(report.reference, None);
        assert_eq!(report.lookup(EntityKind::Token).unwrap().found.len(), 2);
    }

    #[test]
    fn test_report_serializes() {
        let snapshot = window(vec![
            source(SourceId::Indexer, &["a"]),
            source(SourceId::Aggregator, &["a", "b"]),
        ]);
        let report = run(&snapshot, CompareConfig::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(json["mode"], "streams");
        assert_eq!(json["comparisons"][0]["partition"]["only_reference"][0], "b");
        assert!(json["run_id"].is_string());
    }
}
