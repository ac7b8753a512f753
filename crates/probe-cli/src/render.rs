//! Report output: console summary and JSON.

use crate::error::AppResult;
use probe_compare::{ProbeReport, RunStatus};
use std::path::Path;
use tracing::{info, warn};

/// Log a human-readable summary of the report.
pub fn log_summary(report: &ProbeReport) {
    info!(
        run_id = %report.run_id,
        mode = report.mode.as_str(),
        window_ms = report.window_ms,
        "Probe run summary"
    );

    for source in &report.sources {
        if source.available {
            info!(
                source = %source.source,
                tokens = source.tokens_seen,
                transactions = source.transactions_seen,
                admitted = source.admitted,
                filtered_out = source.filtered_out,
                decode_failures = source.decode_failures,
                normalization_skips = source.normalization_skips,
                pre_ack_dropped = source.pre_ack_dropped,
                late_dropped = source.late_dropped,
                buys = source.buys,
                sells = source.sells,
                volume_usd = %source.volume_usd.round_dp(2),
                "Source"
            );
        } else {
            warn!(
                source = %source.source,
                reason = source.unavailable_reason.as_deref().unwrap_or("unknown"),
                "Source unavailable"
            );
        }
    }

    for c in &report.comparisons {
        info!(
            kind = %c.kind,
            candidate = %c.candidate,
            reference = %c.reference,
            candidate_seen = c.candidate_seen,
            reference_seen = c.reference_seen,
            common = c.partition.common.len(),
            only_candidate = c.partition.only_candidate.len(),
            only_reference = c.partition.only_reference.len(),
            coverage_pct = %c.coverage_pct.round_dp(2),
            overlap_pct = %c.overlap_pct.round_dp(2),
            threshold_pct = %c.threshold_pct,
            verdict = %c.verdict,
            "Stream comparison"
        );
    }

    for l in &report.lookups {
        info!(
            kind = %l.kind,
            candidate = %l.candidate,
            found = l.found.len(),
            missing = l.missing.len(),
            failed = l.failed.len(),
            coverage_pct = %l.coverage_pct.round_dp(2),
            threshold_pct = %l.threshold_pct,
            verdict = %l.verdict,
            "Lookup comparison"
        );
    }

    let reason = report.status_reason.as_deref().unwrap_or("");
    match report.status {
        RunStatus::Pass => info!(status = %report.status, "Probe passed"),
        RunStatus::Fail => warn!(status = %report.status, reason, "Probe failed"),
        RunStatus::Inconclusive => warn!(status = %report.status, reason, "Probe inconclusive"),
    }
}

/// Pretty-printed JSON report.
pub fn to_json(report: &ProbeReport) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write the JSON report to `path`.
pub fn write_report(report: &ProbeReport, path: &Path) -> AppResult<()> {
    std::fs::write(path, to_json(report)?)?;
    info!(path = %path.display(), "Report written");
    Ok(())
}

/// Write the Prometheus text exposition to `path`.
pub fn write_metrics(path: &Path) -> AppResult<()> {
    std::fs::write(path, probe_telemetry::Metrics::gather_text()?)?;
    info!(path = %path.display(), "Metrics written");
    Ok(())
}
