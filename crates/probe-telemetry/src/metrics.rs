//! Prometheus metrics for the coverage probe.
//!
//! Covers:
//! - Observation admission outcomes per source and kind
//! - Per-message drops (decode failures, normalization skips, pre-ack data)
//! - Transport and lookup outcomes
//! - The coverage result of the last run
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, which must crash at startup. These panics
//! only occur during static initialization.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

/// Observations offered to the collector.
/// Labels: source, kind, outcome (new/duplicate/filtered/late/closed/unavailable/unknown)
pub static OBSERVATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "probe_observations_total",
        "Observations offered to the collector by admission outcome",
        &["source", "kind", "outcome"]
    )
    .unwrap()
});

/// Frames that could not be decoded.
pub static DECODE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "probe_decode_failures_total",
        "Frames dropped because they could not be decoded",
        &["source"]
    )
    .unwrap()
});

/// Entities skipped by a normalizer.
pub static NORMALIZATION_SKIPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "probe_normalization_skips_total",
        "Entities skipped because they matched no known shape",
        &["source"]
    )
    .unwrap()
});

/// Data frames received before the subscription ack.
pub static PRE_ACK_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "probe_pre_ack_dropped_total",
        "Data frames dropped because they arrived before the subscription ack",
        &["source"]
    )
    .unwrap()
});

/// Transport failures. Labels: source, reason
pub static TRANSPORT_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "probe_transport_failures_total",
        "Feed connections that ended in a transport failure",
        &["source", "reason"]
    )
    .unwrap()
});

/// Feed connection state (1 = streaming).
pub static FEED_CONNECTED: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "probe_feed_connected",
        "Feed connection state (1=streaming)",
        &["source"]
    )
    .unwrap()
});

/// Reference lookups by outcome (found/missing/failed).
pub static LOOKUP_OUTCOMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "probe_lookup_outcomes_total",
        "Reference lookups by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Reference lookup latency in milliseconds.
pub static LOOKUP_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "probe_lookup_latency_ms",
        "Reference lookup latency in milliseconds",
        &["outcome"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Distinct identities seen in the last window.
pub static SEEN_IDENTITIES: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "probe_seen_identities",
        "Distinct identities admitted in the last window",
        &["source", "kind"]
    )
    .unwrap()
});

/// Coverage percentage of the last run per entity kind.
pub static COVERAGE_PCT: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "probe_coverage_pct",
        "Coverage percentage of the last comparison",
        &["kind", "mode"]
    )
    .unwrap()
});

/// Overlap percentage of the last run per entity kind.
pub static OVERLAP_PCT: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "probe_overlap_pct",
        "Common identities as a percentage of the reference set",
        &["kind"]
    )
    .unwrap()
});

/// Status of the last run (0 = pass, 1 = fail, 2 = inconclusive).
pub static RUN_STATUS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "probe_run_status",
        "Status of the last run (0=pass, 1=fail, 2=inconclusive)"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record one admission outcome.
    pub fn observation(source: &str, kind: &str, outcome: &str) {
        OBSERVATIONS_TOTAL
            .with_label_values(&[source, kind, outcome])
            .inc();
    }

    pub fn decode_failure(source: &str) {
        DECODE_FAILURES_TOTAL.with_label_values(&[source]).inc();
    }

    /// Record `count` normalization skips.
    pub fn normalization_skips(source: &str, count: u64) {
        if count > 0 {
            NORMALIZATION_SKIPS_TOTAL
                .with_label_values(&[source])
                .inc_by(count as f64);
        }
    }

    pub fn pre_ack_dropped(source: &str) {
        PRE_ACK_DROPPED_TOTAL.with_label_values(&[source]).inc();
    }

    /// Record a transport failure and mark the feed disconnected.
    pub fn transport_failure(source: &str, reason: &str) {
        TRANSPORT_FAILURES_TOTAL
            .with_label_values(&[source, reason])
            .inc();
        FEED_CONNECTED.with_label_values(&[source]).set(0.0);
    }

    pub fn feed_connected(source: &str, connected: bool) {
        FEED_CONNECTED
            .with_label_values(&[source])
            .set(if connected { 1.0 } else { 0.0 });
    }

    /// Record one reference lookup.
    pub fn lookup(outcome: &str, latency_ms: f64) {
        LOOKUP_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
        LOOKUP_LATENCY_MS
            .with_label_values(&[outcome])
            .observe(latency_ms);
    }

    pub fn seen_identities(source: &str, kind: &str, count: usize) {
        SEEN_IDENTITIES
            .with_label_values(&[source, kind])
            .set(count as f64);
    }

    pub fn coverage(kind: &str, mode: &str, coverage_pct: f64) {
        COVERAGE_PCT
            .with_label_values(&[kind, mode])
            .set(coverage_pct);
    }

    pub fn overlap(kind: &str, overlap_pct: f64) {
        OVERLAP_PCT.with_label_values(&[kind]).set(overlap_pct);
    }

    /// Record the run status code (0 = pass, 1 = fail, 2 = inconclusive).
    pub fn run_status(code: u8) {
        RUN_STATUS.set(f64::from(code));
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
