//! Candidate stream vs on-demand reference lookups.

use crate::verdict::{percentage, Verdict};
use futures_util::stream::{self, StreamExt};
use probe_core::{EntityKind, IdentityKey, SourceId};
use probe_feed::SourceSnapshot;
use probe_lookup::ReferenceLookup;
use probe_telemetry::Metrics;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lookup-mode settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupCompareConfig {
    /// Maximum lookups in flight.
    pub concurrency: usize,
    /// Deadline per lookup call.
    pub timeout: Duration,
    pub threshold_pct: Decimal,
}

impl Default for LookupCompareConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout: Duration::from_secs(5),
            threshold_pct: Decimal::from(85),
        }
    }
}

/// Outcome of one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found,
    Missing,
    /// Error or timeout; counts neither for nor against coverage.
    Failed(String),
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::Missing => "missing",
            Self::Failed(_) => "failed",
        }
    }
}

/// Result of checking every candidate identity against the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupComparison {
    pub kind: EntityKind,
    pub candidate: SourceId,
    pub found: BTreeSet<IdentityKey>,
    pub missing: BTreeSet<IdentityKey>,
    /// Identity → failure reason.
    pub failed: BTreeMap<IdentityKey, String>,
    /// `found / (found + missing) * 100`; 100 when nothing was decided.
    pub coverage_pct: Decimal,
    pub threshold_pct: Decimal,
    pub verdict: Verdict,
}

impl LookupComparison {
    pub fn checked(&self) -> usize {
        self.found.len() + self.missing.len() + self.failed.len()
    }
}

/// Look up every identity the candidate saw for `kind`.
pub async fn compare_with_lookup(
    candidate: &SourceSnapshot,
    kind: EntityKind,
    lookup: &dyn ReferenceLookup,
    config: &LookupCompareConfig,
) -> LookupComparison {
    let identities: Vec<IdentityKey> = candidate.accumulator(kind).identities().cloned().collect();
    info!(
        %kind,
        candidate = %candidate.source,
        identities = identities.len(),
        concurrency = config.concurrency,
        "Starting reference lookups"
    );

    let outcomes: Vec<(IdentityKey, LookupOutcome)> = stream::iter(identities)
        .map(|identity| async move {
            let outcome = lookup_one(lookup, &identity, config.timeout).await;
            (identity, outcome)
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    let mut found = BTreeSet::new();
    let mut missing = BTreeSet::new();
    let mut failed = BTreeMap::new();
    for (identity, outcome) in outcomes {
        match outcome {
            LookupOutcome::Found => {
                found.insert(identity);
            }
            LookupOutcome::Missing => {
                missing.insert(identity);
            }
            LookupOutcome::Failed(reason) => {
                failed.insert(identity, reason);
            }
        }
    }

    let coverage_pct = percentage(found.len(), found.len() + missing.len());
    let verdict = Verdict::from_coverage(coverage_pct, config.threshold_pct);
    info!(
        %kind,
        found = found.len(),
        missing = missing.len(),
        failed = failed.len(),
        coverage_pct = %coverage_pct.round_dp(2),
        %verdict,
        "Lookup comparison complete"
    );

    LookupComparison {
        kind,
        candidate: candidate.source,
        found,
        missing,
        failed,
        coverage_pct,
        threshold_pct: config.threshold_pct,
        verdict,
    }
}

async fn lookup_one(
    lookup: &dyn ReferenceLookup,
    identity: &IdentityKey,
    timeout: Duration,
) -> LookupOutcome {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, lookup.lookup(identity)).await {
        Ok(Ok(Some(_))) => LookupOutcome::Found,
        Ok(Ok(None)) => {
            debug!(%identity, "Reference does not know identity");
            LookupOutcome::Missing
        }
        Ok(Err(e)) => {
            warn!(%identity, error = %e, "Lookup failed");
            LookupOutcome::Failed(e.to_string())
        }
        Err(_) => {
            warn!(%identity, timeout_ms = timeout.as_millis() as u64, "Lookup timed out");
            LookupOutcome::Failed(format!("timed out after {}ms", timeout.as_millis()))
        }
    };
    Metrics::lookup(outcome.as_str(), started.elapsed().as_secs_f64() * 1000.0);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_feed::AccumulatorSnapshot;
    use probe_lookup::{EntityRecord, LookupError, MockReferenceLookup};
    use rust_decimal_macros::dec;

    fn candidate(ids: &[&str]) -> SourceSnapshot {
        let tokens: AccumulatorSnapshot = ids.iter().map(|s| IdentityKey::parse(s).unwrap()).collect();
        SourceSnapshot::new(SourceId::Indexer).with_kind(EntityKind::Token, tokens)
    }

    #[tokio::test]
    async fn test_failures_excluded_from_denominator() {
        let mut mock = MockReferenceLookup::new();
        mock.expect_lookup().returning(|id| match id.as_str() {
            "a" | "b" | "c" => Ok(Some(EntityRecord::new(id.clone()))),
            "d" => Ok(None),
            _ => Err(LookupError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        });

        let result = compare_with_lookup(
            &candidate(&["a", "b", "c", "d", "e", "f"]),
            EntityKind::Token,
            &mock,
            &LookupCompareConfig::default(),
        )
        .await;

        assert_eq!(result.found.len(), 3);
        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.failed.len(), 2);
        assert_eq!(result.checked(), 6);
        // 3 / (3 + 1)
        assert_eq!(result.coverage_pct, dec!(75));
        assert_eq!(result.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_all_failed_is_vacuous_pass() {
        let mut mock = MockReferenceLookup::new();
        mock.expect_lookup()
            .times(2)
            .returning(|_| Err(LookupError::Timeout(10)));

        let result = compare_with_lookup(
            &candidate(&["a", "b"]),
            EntityKind::Token,
            &mock,
            &LookupCompareConfig::default(),
        )
        .await;
        assert_eq!(result.coverage_pct, dec!(100));
        assert!(result.verdict.is_pass());
        assert_eq!(result.failed.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_candidate_makes_no_calls() {
        let mut mock = MockReferenceLookup::new();
        mock.expect_lookup().never();

        let result = compare_with_lookup(
            &candidate(&[]),
            EntityKind::Token,
            &mock,
            &LookupCompareConfig::default(),
        )
        .await;
        assert_eq!(result.checked(), 0);
        assert!(result.verdict.is_pass());
    }

    struct SlowLookup;

    #[async_trait::async_trait]
    impl ReferenceLookup for SlowLookup {
        async fn lookup(
            &self,
            identity: &IdentityKey,
        ) -> probe_lookup::LookupResult<Option<EntityRecord>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some(EntityRecord::new(identity.clone())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed() {
        let config = LookupCompareConfig {
            timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let result =
            compare_with_lookup(&candidate(&["a"]), EntityKind::Token, &SlowLookup, &config).await;
        assert_eq!(result.failed.len(), 1);
        assert!(result.failed.values().all(|r| r.contains("timed out")));
    }
}
