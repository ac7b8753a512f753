//! Frozen window contents handed to the comparator.

use crate::accumulator::AccumulatorSnapshot;
use chrono::{DateTime, Utc};
use probe_core::{EntityKind, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a source delivered for the whole window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceStatus {
    Available,
    Unavailable { reason: String },
}

/// One source's share of a closed window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub source: SourceId,
    pub status: SourceStatus,
    pub tokens: AccumulatorSnapshot,
    pub transactions: AccumulatorSnapshot,
    /// Observations rejected by the identity filter.
    pub filtered_out: u64,
    pub decode_failures: u64,
    pub normalization_skips: u64,
    pub pre_ack_dropped: u64,
    /// Observations offered after the window duration elapsed.
    pub late_dropped: u64,
}

impl SourceSnapshot {
    /// Empty, available snapshot for `source`.
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            status: SourceStatus::Available,
            tokens: AccumulatorSnapshot::default(),
            transactions: AccumulatorSnapshot::default(),
            filtered_out: 0,
            decode_failures: 0,
            normalization_skips: 0,
            pre_ack_dropped: 0,
            late_dropped: 0,
        }
    }

    pub fn with_kind(mut self, kind: EntityKind, accumulator: AccumulatorSnapshot) -> Self {
        match kind {
            EntityKind::Token => self.tokens = accumulator,
            EntityKind::Transaction => self.transactions = accumulator,
        }
        self
    }

    pub fn accumulator(&self, kind: EntityKind) -> &AccumulatorSnapshot {
        match kind {
            EntityKind::Token => &self.tokens,
            EntityKind::Transaction => &self.transactions,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == SourceStatus::Available
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.status {
            SourceStatus::Available => None,
            SourceStatus::Unavailable { reason } => Some(reason),
        }
    }

    /// Admitted observations across both kinds.
    pub fn admitted(&self) -> u64 {
        self.tokens.admitted + self.transactions.admitted
    }
}

/// Everything the collector accumulated in one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    /// Configured window length.
    pub duration_ms: u64,
    pub sources: BTreeMap<SourceId, SourceSnapshot>,
}

impl WindowSnapshot {
    pub fn source(&self, source: SourceId) -> Option<&SourceSnapshot> {
        self.sources.get(&source)
    }

    /// Registered stream sources (everything except the lookup service).
    pub fn stream_sources(&self) -> impl Iterator<Item = &SourceSnapshot> {
        self.sources.values().filter(|s| s.source.is_stream())
    }
}
