//! Upstream collaborator seams.
//!
//! The engine never talks to the monitoring API directly; it consumes
//! already-authenticated capabilities injected as trait objects. Concrete
//! transports (and credential handling) live outside this crate.

use std::collections::HashMap;

use async_trait::async_trait;

use cloudpull_core::{CandidateMetric, Dimension, Partition, Sample, StatKind};

use crate::error::FetchError;

/// Aggregation period requested from the upstream API, seconds.
pub const DEFAULT_PERIOD_SECS: u64 = 60;

/// One statistics query against the upstream API.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub stats: Vec<StatKind>,
    /// Inclusive start, epoch seconds. Never more than one day before `end`.
    pub start: u64,
    /// Exclusive end, epoch seconds.
    pub end: u64,
    pub period_secs: u64,
}

/// Lists candidate metrics for a partition and namespace.
///
/// Implementations own any listing filters (the EC2 per-instance filter
/// that skips terminated instances, pagination, etc.).
#[async_trait]
pub trait MetricLister: Send + Sync {
    async fn list(
        &self,
        partition: &Partition,
        namespace: &str,
    ) -> anyhow::Result<Vec<CandidateMetric>>;
}

/// Fetches statistic samples for one metric over one sub-window.
#[async_trait]
pub trait MetricFetcher: Send + Sync {
    async fn fetch(
        &self,
        partition: &Partition,
        request: &FetchRequest,
    ) -> Result<Vec<Sample>, FetchError>;
}

/// Describes instances and their tags for a partition.
///
/// `tag_keys` filters which tags are returned; a single `"*"` entry means
/// all of them. Returns instance id → tag map.
#[async_trait]
pub trait InstanceTagProvider: Send + Sync {
    async fn describe_tags(
        &self,
        partition: &Partition,
        tag_keys: &[String],
    ) -> anyhow::Result<HashMap<String, HashMap<String, String>>>;
}
