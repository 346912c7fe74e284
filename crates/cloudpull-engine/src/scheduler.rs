//! Fetch scheduler — partitioned, rate-bounded metric retrieval.
//!
//! Work is partitioned by (account, region); each partition runs as its
//! own task with an inner worker pool bounded by a semaphore, so no more
//! than `workers` upstream calls are in flight per partition. Windows
//! longer than the upstream one-day query limit are split into
//! consecutive sub-windows whose results are concatenated in
//! chronological order. Transient fetch errors are retried with doubling
//! backoff; fatal errors (and an exhausted retry budget) fail that one
//! metric without cancelling its siblings.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use cloudpull_core::{
    CandidateMetric, MAX_QUERY_SPAN_SECS, MetricRegistry, MetricRule, Partition, Sample,
    TimeWindow,
};

use crate::error::{EngineError, EngineResult, FetchError};
use crate::upstream::{DEFAULT_PERIOD_SECS, FetchRequest, MetricFetcher};

/// A candidate metric paired with the single rule that governs it.
#[derive(Debug, Clone)]
pub struct ResolvedMetric {
    pub candidate: CandidateMetric,
    pub rule: Arc<MetricRule>,
}

impl ResolvedMetric {
    /// The normalized dotted identifier, for logging and error reporting.
    pub fn identifier(&self) -> String {
        MetricRegistry::identifier(&self.candidate.namespace, &self.candidate.metric_name)
    }
}

/// Fetch work for one partition.
#[derive(Debug, Clone)]
pub struct PartitionWork {
    pub partition: Partition,
    /// Inner worker-pool size (max in-flight upstream calls).
    pub workers: usize,
    pub window: TimeWindow,
    pub metrics: Vec<ResolvedMetric>,
}

/// One metric's result, pushed onto the outcome stream.
#[derive(Debug)]
pub struct FetchOutcome {
    pub partition: Partition,
    pub metric: ResolvedMetric,
    /// Chronologically ordered samples, or this metric's failure.
    pub result: EngineResult<Vec<Sample>>,
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
    max_backoff: Duration,
}

/// Fans fetch work out across partitions and bounded worker pools.
pub struct FetchScheduler {
    fetcher: Arc<dyn MetricFetcher>,
    policy: RetryPolicy,
}

impl FetchScheduler {
    pub fn new(fetcher: Arc<dyn MetricFetcher>) -> Self {
        Self {
            fetcher,
            policy: RetryPolicy {
                max_attempts: 3,
                backoff_base: Duration::from_millis(500),
                max_backoff: Duration::from_secs(8),
            },
        }
    }

    /// Override the retry budget and backoff base (used by tests).
    pub fn with_retry(
        fetcher: Arc<dyn MetricFetcher>,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            fetcher,
            policy: RetryPolicy {
                max_attempts: max_attempts.max(1),
                backoff_base,
                max_backoff: Duration::from_secs(8),
            },
        }
    }

    /// Spawn all partition tasks and return the outcome stream.
    ///
    /// The stream ends once every partition has drained. Flipping the
    /// cancel signal stops tasks before their next upstream call.
    pub fn spawn(
        &self,
        work: Vec<PartitionWork>,
        cancel: watch::Receiver<bool>,
    ) -> mpsc::Receiver<FetchOutcome> {
        let (tx, rx) = mpsc::channel(256);
        for part in work {
            let fetcher = self.fetcher.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            let policy = self.policy;
            tokio::spawn(partition_task(fetcher, part, policy, tx, cancel));
        }
        rx
    }
}

/// Run one partition: dedup, then fan metrics out over a bounded pool.
async fn partition_task(
    fetcher: Arc<dyn MetricFetcher>,
    work: PartitionWork,
    policy: RetryPolicy,
    tx: mpsc::Sender<FetchOutcome>,
    cancel: watch::Receiver<bool>,
) {
    debug!(
        partition = %work.partition,
        metrics = work.metrics.len(),
        workers = work.workers,
        start = work.window.start,
        end = work.window.end,
        "partition fetch started"
    );

    let semaphore = Arc::new(Semaphore::new(work.workers.max(1)));
    let mut seen: HashSet<String> = HashSet::new();
    let mut tasks = JoinSet::new();

    for metric in work.metrics {
        // At most one fetch per (namespace, metric, dimensions) per run.
        if !seen.insert(metric.candidate.dedup_key()) {
            debug!(identifier = %metric.identifier(), "duplicate candidate skipped");
            continue;
        }

        let fetcher = fetcher.clone();
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        let partition = work.partition.clone();
        let window = work.window;

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let result =
                fetch_metric(fetcher.as_ref(), &partition, &metric, window, policy, cancel).await;
            let _ = tx
                .send(FetchOutcome {
                    partition,
                    metric,
                    result,
                })
                .await;
        });
    }

    while tasks.join_next().await.is_some() {}
    debug!(partition = %work.partition, "partition fetch drained");
}

/// Fetch one metric across all of its sub-windows.
async fn fetch_metric(
    fetcher: &dyn MetricFetcher,
    partition: &Partition,
    metric: &ResolvedMetric,
    window: TimeWindow,
    policy: RetryPolicy,
    mut cancel: watch::Receiver<bool>,
) -> EngineResult<Vec<Sample>> {
    let identifier = metric.identifier();
    let mut samples = Vec::new();

    for (start, end) in window.split(MAX_QUERY_SPAN_SECS) {
        if *cancel.borrow() {
            return Err(EngineError::Metric {
                identifier,
                reason: "run cancelled".to_string(),
            });
        }

        let request = FetchRequest {
            namespace: metric.candidate.namespace.clone(),
            metric_name: metric.candidate.metric_name.clone(),
            dimensions: metric.candidate.dimensions.clone(),
            stats: metric.rule.stats.clone(),
            start,
            end,
            period_secs: DEFAULT_PERIOD_SECS,
        };

        let batch =
            fetch_with_retry(fetcher, partition, &identifier, &request, policy, &mut cancel)
                .await?;
        samples.extend(batch);
    }

    // Sub-windows are appended in chronological order; a stable sort
    // keeps that order for equal timestamps within a batch.
    samples.sort_by_key(|s| s.timestamp);
    Ok(samples)
}

/// One sub-window fetch with the transient-error retry budget.
async fn fetch_with_retry(
    fetcher: &dyn MetricFetcher,
    partition: &Partition,
    identifier: &str,
    request: &FetchRequest,
    policy: RetryPolicy,
    cancel: &mut watch::Receiver<bool>,
) -> EngineResult<Vec<Sample>> {
    let mut backoff = policy.backoff_base;

    for attempt in 1..=policy.max_attempts {
        match fetcher.fetch(partition, request).await {
            Ok(samples) => return Ok(samples),
            Err(FetchError::Fatal(reason)) => {
                return Err(EngineError::Metric {
                    identifier: identifier.to_string(),
                    reason,
                });
            }
            Err(FetchError::Transient(reason)) => {
                if attempt == policy.max_attempts {
                    return Err(EngineError::Metric {
                        identifier: identifier.to_string(),
                        reason: format!("retry budget exhausted after {attempt} attempts: {reason}"),
                    });
                }
                warn!(
                    %identifier,
                    partition = %partition,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    %reason,
                    "transient fetch error, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.changed() => {}
                }
                if *cancel.borrow() {
                    return Err(EngineError::Metric {
                        identifier: identifier.to_string(),
                        reason: "run cancelled".to_string(),
                    });
                }
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }

    unreachable!("retry loop returns on its final attempt")
}
