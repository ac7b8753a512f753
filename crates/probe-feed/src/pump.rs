//! Feed pump: adapter signals → normalizer → collector.
//!
//! One pump per adapter. The pump drains the adapter's channel until the
//! sender side is dropped, which happens when the adapter task ends.

use crate::collector::{Admission, Collector};
use crate::normalizer::Normalizer;
use probe_core::SourceId;
use probe_telemetry::Metrics;
use probe_ws::FeedSignal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-pump counters, reported when the pump ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub events: u64,
    pub observations: u64,
    pub new: u64,
    pub duplicates: u64,
    pub filtered: u64,
    /// Late, closed, unavailable or unknown-source admissions.
    pub dropped: u64,
    pub skipped: u64,
    pub decode_failures: u64,
    pub pre_ack_dropped: u64,
    /// Signals from a different source than the pump's normalizer.
    pub misrouted: u64,
}

impl PumpStats {
    fn record(&mut self, admission: Admission) {
        self.observations += 1;
        match admission {
            Admission::New => self.new += 1,
            Admission::Duplicate => self.duplicates += 1,
            Admission::Filtered => self.filtered += 1,
            Admission::Late | Admission::Closed | Admission::Unavailable | Admission::Unknown => {
                self.dropped += 1
            }
        }
    }
}

/// Routes one adapter's signals into the shared collector.
pub struct FeedPump {
    normalizer: Arc<dyn Normalizer>,
    collector: Arc<Collector>,
}

impl FeedPump {
    pub fn new(normalizer: Arc<dyn Normalizer>, collector: Arc<Collector>) -> Self {
        Self {
            normalizer,
            collector,
        }
    }

    pub fn source(&self) -> SourceId {
        self.normalizer.source()
    }

    /// Handle one signal.
    pub fn handle(&self, signal: FeedSignal, stats: &mut PumpStats) {
        let source = self.source();
        if signal.source() != source {
            warn!(
                expected = %source,
                actual = %signal.source(),
                "Dropping signal routed to the wrong pump"
            );
            stats.misrouted += 1;
            return;
        }

        match signal {
            FeedSignal::Event(raw) => {
                stats.events += 1;
                if stats.events == 1 {
                    Metrics::feed_connected(source.as_str(), true);
                }
                let normalized = self.normalizer.normalize(&raw);
                if normalized.skipped > 0 {
                    stats.skipped += normalized.skipped;
                    self.collector.record_skipped(source, normalized.skipped);
                    Metrics::normalization_skips(source.as_str(), normalized.skipped);
                }
                for obs in normalized.observations {
                    let admission = self.collector.admit(obs);
                    stats.record(admission);
                }
            }
            FeedSignal::DecodeFailure { reason, .. } => {
                debug!(%source, %reason, "Decode failure");
                stats.decode_failures += 1;
                self.collector.record_decode_failure(source);
                Metrics::decode_failure(source.as_str());
            }
            FeedSignal::PreAckDropped { .. } => {
                stats.pre_ack_dropped += 1;
                self.collector.record_pre_ack(source);
                Metrics::pre_ack_dropped(source.as_str());
            }
        }
    }

    /// Drain `rx` until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<FeedSignal>) -> PumpStats {
        let mut stats = PumpStats::default();
        while let Some(signal) = rx.recv().await {
            self.handle(signal, &mut stats);
        }
        Metrics::feed_connected(self.source().as_str(), false);
        info!(
            source = %self.source(),
            events = stats.events,
            new = stats.new,
            duplicates = stats.duplicates,
            filtered = stats.filtered,
            dropped = stats.dropped,
            skipped = stats.skipped,
            "Feed pump finished"
        );
        stats
    }
}
