//! Windowed observation collector.
//!
//! One collector per run. The window is an explicit state machine
//! (`Pending → Open → Closed`). Observations are admitted only while the
//! window is open and its duration has not elapsed; closing freezes the
//! contents into a `WindowSnapshot`.
//!
//! Sources are registered at construction and each owns its own mutex, so
//! admissions for different sources never contend. Every admission holds a
//! read guard on the window state, which makes `close` a hard cutover: no
//! admission can land after the snapshot is taken.

use crate::accumulator::SourceAccumulator;
use crate::error::{FeedError, FeedResult};
use crate::snapshot::{SourceSnapshot, SourceStatus, WindowSnapshot};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use probe_core::{EntityKind, IdentityFilter, Observation, SourceId};
use probe_telemetry::Metrics;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of offering one observation to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting of this identity in the window.
    New,
    /// Already seen; secondary counters updated only.
    Duplicate,
    /// Rejected by the identity filter.
    Filtered,
    /// Window duration already elapsed.
    Late,
    /// Window not open (pending or closed).
    Closed,
    /// Source was marked unavailable.
    Unavailable,
    /// Source not registered with this collector.
    Unknown,
}

impl Admission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Duplicate => "duplicate",
            Self::Filtered => "filtered",
            Self::Late => "late",
            Self::Closed => "closed",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        }
    }
}

/// Public view of the window lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    Pending,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy)]
enum WindowState {
    Pending,
    Open {
        started: Instant,
        opened_at: DateTime<Utc>,
    },
    Closed,
}

#[derive(Debug, Default)]
struct SourceLedger {
    tokens: SourceAccumulator,
    transactions: SourceAccumulator,
    filtered_out: u64,
    decode_failures: u64,
    normalization_skips: u64,
    pre_ack_dropped: u64,
    late_dropped: u64,
    unavailable: Option<String>,
}

impl SourceLedger {
    fn accumulator_mut(&mut self, kind: EntityKind) -> &mut SourceAccumulator {
        match kind {
            EntityKind::Token => &mut self.tokens,
            EntityKind::Transaction => &mut self.transactions,
        }
    }

    fn snapshot(&self, source: SourceId) -> SourceSnapshot {
        SourceSnapshot {
            source,
            status: match &self.unavailable {
                None => SourceStatus::Available,
                Some(reason) => SourceStatus::Unavailable {
                    reason: reason.clone(),
                },
            },
            tokens: self.tokens.snapshot(),
            transactions: self.transactions.snapshot(),
            filtered_out: self.filtered_out,
            decode_failures: self.decode_failures,
            normalization_skips: self.normalization_skips,
            pre_ack_dropped: self.pre_ack_dropped,
            late_dropped: self.late_dropped,
        }
    }
}

/// Shared, thread-safe collector for one window.
pub struct Collector {
    filter: IdentityFilter,
    duration: Duration,
    window: RwLock<WindowState>,
    ledgers: HashMap<SourceId, Mutex<SourceLedger>>,
    snapshot: OnceCell<Arc<WindowSnapshot>>,
}

impl Collector {
    /// Create a pending collector for `sources`.
    pub fn new(
        filter: IdentityFilter,
        duration: Duration,
        sources: impl IntoIterator<Item = SourceId>,
    ) -> FeedResult<Self> {
        if duration.is_zero() {
            return Err(FeedError::InvalidConfig(
                "window duration must be positive".to_string(),
            ));
        }
        let ledgers: HashMap<_, _> = sources
            .into_iter()
            .map(|source| (source, Mutex::new(SourceLedger::default())))
            .collect();
        if ledgers.is_empty() {
            return Err(FeedError::InvalidConfig(
                "at least one source must be registered".to_string(),
            ));
        }

        Ok(Self {
            filter,
            duration,
            window: RwLock::new(WindowState::Pending),
            ledgers,
            snapshot: OnceCell::new(),
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn filter(&self) -> &IdentityFilter {
        &self.filter
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.ledgers.keys().copied()
    }

    pub fn phase(&self) -> WindowPhase {
        match *self.window.read() {
            WindowState::Pending => WindowPhase::Pending,
            WindowState::Open { .. } => WindowPhase::Open,
            WindowState::Closed => WindowPhase::Closed,
        }
    }

    /// Open the window now.
    pub fn open(&self) -> FeedResult<()> {
        self.open_at(Instant::now())
    }

    /// Open the window with an explicit monotonic start.
    pub fn open_at(&self, started: Instant) -> FeedResult<()> {
        let mut window = self.window.write();
        match *window {
            WindowState::Pending => {
                *window = WindowState::Open {
                    started,
                    opened_at: Utc::now(),
                };
                info!(
                    duration_ms = self.duration.as_millis() as u64,
                    sources = self.ledgers.len(),
                    "Collection window opened"
                );
                Ok(())
            }
            WindowState::Open { .. } => Err(FeedError::WindowState("already open")),
            WindowState::Closed => Err(FeedError::WindowState("closed")),
        }
    }

    /// Time left before the window stops admitting. `None` unless open.
    pub fn remaining(&self) -> Option<Duration> {
        match *self.window.read() {
            WindowState::Open { started, .. } => {
                Some(self.duration.saturating_sub(started.elapsed()))
            }
            _ => None,
        }
    }

    /// Offer an observation now.
    pub fn admit(&self, obs: Observation) -> Admission {
        self.admit_at(obs, Instant::now())
    }

    /// Offer an observation with an explicit monotonic timestamp.
    pub fn admit_at(&self, obs: Observation, now: Instant) -> Admission {
        let source = obs.source;
        let kind = obs.kind;
        let outcome = self.admit_inner(obs, now);
        Metrics::observation(source.as_str(), kind.as_str(), outcome.as_str());
        outcome
    }

    fn admit_inner(&self, obs: Observation, now: Instant) -> Admission {
        // Held until the observation is recorded.
        let window = self.window.read();
        let WindowState::Open { started, .. } = *window else {
            return Admission::Closed;
        };

        let Some(ledger) = self.ledgers.get(&obs.source) else {
            debug!(source = %obs.source, "Observation from unregistered source");
            return Admission::Unknown;
        };
        let mut ledger = ledger.lock();

        let offset = now.saturating_duration_since(started);
        if offset >= self.duration {
            ledger.late_dropped += 1;
            return Admission::Late;
        }
        if ledger.unavailable.is_some() {
            return Admission::Unavailable;
        }
        if !self.filter.is_tracked(&obs) {
            ledger.filtered_out += 1;
            return Admission::Filtered;
        }

        if ledger.accumulator_mut(obs.kind).admit(obs, offset) {
            Admission::New
        } else {
            Admission::Duplicate
        }
    }

    /// Count one undecodable frame for `source`.
    pub fn record_decode_failure(&self, source: SourceId) {
        self.with_open_ledger(source, |ledger| ledger.decode_failures += 1);
    }

    /// Count `count` entities a normalizer skipped for `source`.
    pub fn record_skipped(&self, source: SourceId, count: u64) {
        if count > 0 {
            self.with_open_ledger(source, |ledger| ledger.normalization_skips += count);
        }
    }

    /// Count one data frame that arrived before the subscription ack.
    pub fn record_pre_ack(&self, source: SourceId) {
        self.with_open_ledger(source, |ledger| ledger.pre_ack_dropped += 1);
    }

    fn with_open_ledger(&self, source: SourceId, f: impl FnOnce(&mut SourceLedger)) {
        let window = self.window.read();
        if !matches!(*window, WindowState::Open { .. }) {
            return;
        }
        if let Some(ledger) = self.ledgers.get(&source) {
            f(&mut *ledger.lock());
        }
    }

    /// Mark a source as failed for this window.
    ///
    /// Drops everything it accumulated and ignores its later admissions. The
    /// first reason wins. Returns `Ok(false)` when the window is already
    /// closed or the source was already unavailable.
    pub fn mark_unavailable(&self, source: SourceId, reason: impl Into<String>) -> FeedResult<bool> {
        let window = self.window.read();
        let ledger = self
            .ledgers
            .get(&source)
            .ok_or(FeedError::UnknownSource(source))?;
        if matches!(*window, WindowState::Closed) {
            return Ok(false);
        }

        let mut ledger = ledger.lock();
        if ledger.unavailable.is_some() {
            return Ok(false);
        }
        let reason = reason.into();
        warn!(%source, %reason, "Source marked unavailable");
        ledger.tokens.clear();
        ledger.transactions.clear();
        ledger.unavailable = Some(reason);
        Ok(true)
    }

    /// Close the window and freeze its contents.
    ///
    /// Idempotent: every call returns the same snapshot.
    pub fn close(&self) -> Arc<WindowSnapshot> {
        self.snapshot
            .get_or_init(|| {
                let mut window = self.window.write();
                let closed_at = Utc::now();
                let opened_at = match *window {
                    WindowState::Open { opened_at, .. } => opened_at,
                    _ => closed_at,
                };
                *window = WindowState::Closed;

                let sources: BTreeMap<_, _> = self
                    .ledgers
                    .iter()
                    .map(|(source, ledger)| (*source, ledger.lock().snapshot(*source)))
                    .collect();

                for snap in sources.values() {
                    for kind in EntityKind::ALL {
                        Metrics::seen_identities(
                            snap.source.as_str(),
                            kind.as_str(),
                            snap.accumulator(kind).len(),
                        );
                    }
                    info!(
                        source = %snap.source,
                        tokens = snap.tokens.len(),
                        transactions = snap.transactions.len(),
                        admitted = snap.admitted(),
                        filtered_out = snap.filtered_out,
                        late_dropped = snap.late_dropped,
                        available = snap.is_available(),
                        "Source window summary"
                    );
                }
                info!("Collection window closed");

                Arc::new(WindowSnapshot {
                    opened_at,
                    closed_at,
                    duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
                    sources,
                })
            })
            .clone()
    }

    /// Snapshot of a closed window, if any.
    pub fn snapshot(&self) -> Option<Arc<WindowSnapshot>> {
        self.snapshot.get().cloned()
    }
}
