//! Application orchestration.
//!
//! One run: open the collection window, drive one adapter and one pump per
//! stream source, close the window on its deadline, stop the feeds, compare,
//! and assemble the report.

use crate::config::AppConfig;
use crate::error::AppResult;
use probe_compare::{
    compare_with_lookup, CompareError, CompareMode, LookupComparison, ProbeReport,
    ReportAssembler, RunStatus,
};
use probe_core::{IdentityFilter, SourceId};
use probe_feed::{Collector, FeedPump, Normalizer, WindowSnapshot};
use probe_lookup::{ReferenceLookup, RestLookupClient};
use probe_telemetry::Metrics;
use probe_ws::{AdapterConfig, FeedAdapter, FeedSignal};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Process exit code for a run that ended with an error.
pub const EXIT_ERROR: u8 = 3;

/// Process exit code for a run status.
pub fn exit_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::Pass => 0,
        RunStatus::Fail => 1,
        RunStatus::Inconclusive => 2,
    }
}

/// Everything needed to start one stream source.
struct StreamPlan {
    adapter: AdapterConfig,
    normalizer: Arc<dyn Normalizer>,
    channel_capacity: usize,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    filter: IdentityFilter,
    lookup: Option<Arc<dyn ReferenceLookup>>,
    /// External interrupt: closes the window early.
    interrupt: CancellationToken,
}

impl Application {
    /// Validate the configuration and build the lookup client if needed.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let filter = IdentityFilter::from_config(&config.tracking)?;

        let lookup: Option<Arc<dyn ReferenceLookup>> =
            match (config.comparison.mode, &config.lookup) {
                (CompareMode::Lookup, Some(lookup)) => Some(Arc::new(
                    RestLookupClient::from_config(lookup, filter.network().clone())?,
                )),
                _ => None,
            };

        info!(
            mode = config.comparison.mode.as_str(),
            candidate = %config.comparison.candidate,
            reference = %config.comparison.reference,
            threshold_pct = %config.comparison.threshold_pct,
            network = %filter.network(),
            suffix = filter.suffix(),
            "Application configured"
        );

        Ok(Self {
            config,
            filter,
            lookup,
            interrupt: CancellationToken::new(),
        })
    }

    /// Replace the reference lookup (used by tests and embedders).
    pub fn with_lookup(mut self, lookup: Arc<dyn ReferenceLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Token that closes the window early when cancelled.
    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run one probe and return its report.
    pub async fn run(self) -> AppResult<ProbeReport> {
        let plans = self.plan_streams()?;
        let sources: Vec<SourceId> = plans.iter().map(|p| p.adapter.source).collect();
        let collector = Arc::new(Collector::new(
            self.filter.clone(),
            self.config.window.duration(),
            sources.iter().copied(),
        )?);
        let stop_feeds = CancellationToken::new();

        collector.open()?;
        info!(
            window_secs = self.config.window.secs,
            sources = ?sources,
            "Collection window open"
        );

        let mut adapters = JoinSet::new();
        let mut pumps = JoinSet::new();
        for plan in plans {
            let (tx, rx) = mpsc::channel::<FeedSignal>(plan.channel_capacity);
            pumps.spawn(FeedPump::new(plan.normalizer, Arc::clone(&collector)).run(rx));
            adapters.spawn(drive_adapter(
                FeedAdapter::new(plan.adapter),
                tx,
                stop_feeds.clone(),
                Arc::clone(&collector),
            ));
        }

        self.await_window(&mut adapters).await;
        let snapshot = collector.close();

        // Feeds get a bounded grace period to unsubscribe.
        stop_feeds.cancel();
        let grace = self.config.window.shutdown_grace();
        drain("adapter", &mut adapters, grace).await;
        drain("pump", &mut pumps, grace).await;

        let report = self.evaluate(&snapshot).await?;
        record_report_metrics(&report);
        Ok(report)
    }

    fn plan_streams(&self) -> AppResult<Vec<StreamPlan>> {
        self.config
            .sources
            .configured()
            .into_iter()
            .map(|(source, cfg)| {
                Ok(StreamPlan {
                    adapter: cfg.adapter_config(source)?,
                    normalizer: cfg.normalizer(source)?,
                    channel_capacity: cfg.channel_capacity,
                })
            })
            .collect()
    }

    /// Wait for the window deadline, an interrupt, or every feed ending.
    async fn await_window(&self, adapters: &mut JoinSet<()>) {
        let deadline = tokio::time::sleep(self.config.window.duration());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = self.interrupt.cancelled() => {
                    warn!("Interrupted; closing the window early");
                    return;
                }
                _ = &mut deadline => {
                    debug!("Window deadline reached");
                    return;
                }
                joined = adapters.join_next() => match joined {
                    Some(Err(e)) => error!(error = %e, "Adapter task panicked"),
                    Some(Ok(())) => {}
                    None => {
                        warn!("Every feed ended before the deadline; closing the window early");
                        return;
                    }
                },
            }
        }
    }

    async fn evaluate(&self, snapshot: &WindowSnapshot) -> AppResult<ProbeReport> {
        let assembler = ReportAssembler::new(self.config.comparison.clone())?;
        let streams = assembler.compare_streams(snapshot)?;
        let lookups = match (self.config.comparison.mode, &self.lookup) {
            (CompareMode::Lookup, Some(lookup)) => {
                self.run_lookups(snapshot, lookup.as_ref()).await?
            }
            _ => Vec::new(),
        };
        Ok(assembler.assemble(snapshot, streams, lookups)?)
    }

    async fn run_lookups(
        &self,
        snapshot: &WindowSnapshot,
        lookup: &dyn ReferenceLookup,
    ) -> AppResult<Vec<LookupComparison>> {
        let candidate_id = self.config.comparison.candidate;
        let candidate = snapshot
            .source(candidate_id)
            .ok_or(CompareError::MissingSource(candidate_id))?;
        if !candidate.is_available() {
            info!(candidate = %candidate_id, "Candidate unavailable; skipping lookups");
            return Ok(Vec::new());
        }

        let settings = self.config.lookup_compare();
        let mut results = Vec::with_capacity(self.config.comparison.gated_kinds.len());
        for kind in &self.config.comparison.gated_kinds {
            results.push(compare_with_lookup(candidate, *kind, lookup, &settings).await);
        }
        Ok(results)
    }
}

/// Run one adapter to completion; a transport failure makes its source unavailable.
async fn drive_adapter(
    adapter: FeedAdapter,
    sink: mpsc::Sender<FeedSignal>,
    shutdown: CancellationToken,
    collector: Arc<Collector>,
) {
    let source = adapter.source();
    match adapter.run(sink, shutdown).await {
        Ok(exit) => debug!(%source, ?exit, "Feed adapter stopped"),
        Err(e) => {
            error!(%source, error = %e, "Feed failed; source unavailable for this run");
            Metrics::transport_failure(source.as_str(), e.kind());
            match collector.mark_unavailable(source, e.to_string()) {
                Ok(true) => {}
                Ok(false) => debug!(%source, "Failure after window close; snapshot unaffected"),
                Err(mark_err) => warn!(%source, error = %mark_err, "Failed to mark source unavailable"),
            }
        }
    }
}

/// Join every task, aborting the rest once `grace` elapses.
async fn drain<T: 'static>(what: &'static str, tasks: &mut JoinSet<T>, grace: Duration) {
    let joined = tokio::time::timeout(grace, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(task = what, error = %e, "Task panicked");
            }
        }
    })
    .await;

    if joined.is_err() {
        warn!(
            task = what,
            remaining = tasks.len(),
            grace_ms = grace.as_millis() as u64,
            "Tasks did not stop within the grace period; aborting"
        );
        tasks.abort_all();
    }
}

fn record_report_metrics(report: &ProbeReport) {
    for comparison in &report.comparisons {
        Metrics::coverage(
            comparison.kind.as_str(),
            CompareMode::Streams.as_str(),
            pct(comparison.coverage_pct),
        );
        Metrics::overlap(comparison.kind.as_str(), pct(comparison.overlap_pct));
    }
    for lookup in &report.lookups {
        Metrics::coverage(
            lookup.kind.as_str(),
            CompareMode::Lookup.as_str(),
            pct(lookup.coverage_pct),
        );
    }
    Metrics::run_status(exit_code(report.status));
}

fn pct(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
