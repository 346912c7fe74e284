//! Collection run orchestration.
//!
//! One `execute` call is one run: per partition it computes the window
//! from the persisted watermark, lists candidates for every rule-named
//! namespace, resolves each candidate against the rule registry, fans the
//! matched set out through the fetch scheduler, emits records, and hands
//! them to the output sink. Watermarks advance per partition, and only
//! for partitions whose run did useful work; a partition whose listing
//! failed (or whose every fetch failed) retries the same window next run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use cloudpull_core::{
    MetricRegistry, Partition, TimeWindow, WindowFilter, compute_window,
};
use cloudpull_state::{RunStore, WatermarkRecord};

use crate::emitter::{EmitOptions, emit};
use crate::error::{EngineError, EngineResult};
use crate::scheduler::{FetchScheduler, PartitionWork, ResolvedMetric};
use crate::sink::OutputSink;
use crate::tags::{InstanceTagCache, TagMap};
use crate::upstream::MetricLister;

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Behavior knobs for a run, lifted from the collector configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub emit: EmitOptions,
    /// Explicit window overrides; beat the persisted watermark.
    pub filter: WindowFilter,
    pub first_run_back_minutes: u64,
}

/// One partition's share of a run.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    pub partition: Partition,
    pub workers: usize,
}

/// What a run did, for the operator log.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub partitions: usize,
    pub failed_partitions: usize,
    /// Candidates returned by listing, before rule resolution.
    pub candidates: usize,
    /// Candidates no rule matched (skipped, not an error).
    pub unmatched: usize,
    pub fetched_metrics: usize,
    pub failed_metrics: usize,
    pub emitted_records: usize,
    /// Samples dropped because no source could be resolved.
    pub dropped_no_source: usize,
    /// Scope key → the window this run queried for it.
    pub windows: Vec<(String, TimeWindow)>,
    pub cancelled: bool,
}

struct PartitionState {
    window: TimeWindow,
    attempted: usize,
    failed: usize,
    listing_error: Option<EngineError>,
    instance_tags: Option<Arc<TagMap>>,
}

pub struct CollectionRun {
    registry: Arc<MetricRegistry>,
    lister: Arc<dyn MetricLister>,
    scheduler: FetchScheduler,
    tag_cache: InstanceTagCache,
    sink: Arc<dyn OutputSink>,
    store: RunStore,
    options: RunOptions,
}

impl CollectionRun {
    pub fn new(
        registry: Arc<MetricRegistry>,
        lister: Arc<dyn MetricLister>,
        scheduler: FetchScheduler,
        tag_cache: InstanceTagCache,
        sink: Arc<dyn OutputSink>,
        store: RunStore,
        options: RunOptions,
    ) -> Self {
        Self {
            registry,
            lister,
            scheduler,
            tag_cache,
            sink,
            store,
            options,
        }
    }

    pub async fn execute(
        &self,
        plans: Vec<PartitionPlan>,
        cancel: watch::Receiver<bool>,
    ) -> EngineResult<RunSummary> {
        self.execute_at(plans, cancel, epoch_secs()).await
    }

    /// Run with an explicit clock (tests pin `now`).
    pub async fn execute_at(
        &self,
        plans: Vec<PartitionPlan>,
        cancel: watch::Receiver<bool>,
        now: u64,
    ) -> EngineResult<RunSummary> {
        let mut summary = RunSummary {
            partitions: plans.len(),
            failed_partitions: 0,
            candidates: 0,
            unmatched: 0,
            fetched_metrics: 0,
            failed_metrics: 0,
            emitted_records: 0,
            dropped_no_source: 0,
            windows: Vec::new(),
            cancelled: false,
        };

        let namespaces = self.registry.namespaces();
        if namespaces.is_empty() {
            warn!("no rule names a listing namespace; nothing to collect");
        }

        // Phase one: windows, listing, and resolution per partition.
        let mut states: HashMap<String, PartitionState> = HashMap::new();
        let mut work = Vec::new();

        for plan in &plans {
            let scope = plan.partition.scope_key();
            let watermark = self.store.load_watermark(&scope)?.map(|r| r.end);
            let window = compute_window(
                watermark,
                &self.options.filter,
                self.options.first_run_back_minutes,
                now,
            );
            summary.windows.push((scope.clone(), window));
            info!(
                partition = %plan.partition,
                start = window.start,
                end = window.end,
                first_run = window.first_run,
                "collection window computed"
            );

            let mut state = PartitionState {
                window,
                attempted: 0,
                failed: 0,
                listing_error: None,
                instance_tags: None,
            };

            let mut metrics = Vec::new();
            for namespace in &namespaces {
                match self.lister.list(&plan.partition, namespace).await {
                    Ok(candidates) => {
                        summary.candidates += candidates.len();
                        for candidate in candidates {
                            let identifier = MetricRegistry::identifier(
                                &candidate.namespace,
                                &candidate.metric_name,
                            );
                            match self.registry.resolve(&identifier) {
                                Some(rule) => metrics.push(ResolvedMetric { candidate, rule }),
                                None => {
                                    debug!(%identifier, "no rule matched, skipped");
                                    summary.unmatched += 1;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let listing = EngineError::Listing(e.to_string());
                        error!(
                            partition = %plan.partition,
                            %namespace,
                            error = %listing,
                            "partition will retry this window"
                        );
                        state.listing_error = Some(listing);
                    }
                }
            }

            if state.listing_error.is_none() && !metrics.is_empty() {
                match self.tag_cache.tags_for(&plan.partition, now).await {
                    Ok(tags) => state.instance_tags = tags,
                    Err(e) => {
                        warn!(
                            partition = %plan.partition,
                            error = %e,
                            "instance tags unavailable, records go unenriched"
                        );
                    }
                }

                state.attempted = metrics.len();
                work.push(PartitionWork {
                    partition: plan.partition.clone(),
                    workers: plan.workers,
                    window,
                    metrics,
                });
            }

            states.insert(scope, state);
        }

        // Phase two: fetch, emit, ship.
        let mut outcomes = self.scheduler.spawn(work, cancel.clone());
        while let Some(outcome) = outcomes.recv().await {
            let scope = outcome.partition.scope_key();
            match outcome.result {
                Ok(samples) => {
                    summary.fetched_metrics += 1;
                    let instance_tags = states
                        .get(&scope)
                        .and_then(|s| s.instance_tags.clone());
                    for sample in &samples {
                        match emit(
                            &outcome.metric.rule,
                            sample,
                            &outcome.partition,
                            instance_tags.as_deref(),
                            &self.options.emit,
                        ) {
                            Ok(records) => {
                                for record in &records {
                                    self.sink
                                        .write(record)
                                        .await
                                        .map_err(|e| EngineError::Sink(e.to_string()))?;
                                }
                                summary.emitted_records += records.len();
                            }
                            Err(e) => {
                                warn!(
                                    identifier = %outcome.metric.identifier(),
                                    error = %e,
                                    "sample dropped"
                                );
                                summary.dropped_no_source += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(partition = %scope, error = %e, "metric failed");
                    summary.failed_metrics += 1;
                    if let Some(state) = states.get_mut(&scope) {
                        state.failed += 1;
                    }
                }
            }
        }

        summary.cancelled = *cancel.borrow();

        // Phase three: advance watermarks for partitions that earned it.
        for plan in &plans {
            let scope = plan.partition.scope_key();
            let Some(state) = states.get(&scope) else {
                continue;
            };
            let failed = state.listing_error.is_some()
                || (state.attempted > 0 && state.failed == state.attempted);
            if failed {
                summary.failed_partitions += 1;
                continue;
            }
            if summary.cancelled {
                continue;
            }
            self.store.save_watermark(
                &scope,
                &WatermarkRecord {
                    end: state.window.end,
                    saved_at: epoch_secs(),
                },
            )?;
        }

        if !summary.cancelled
            && summary.partitions > 0
            && summary.failed_partitions == summary.partitions
        {
            return Err(EngineError::AllPartitionsFailed {
                failed: summary.failed_partitions,
            });
        }

        Ok(summary)
    }
}
