//! Domain types shared across the collector.
//!
//! These types describe raw upstream metric data (candidates, dimensions,
//! statistic samples) and the final emission unit (`OutputRecord`). All
//! timestamps are Unix epoch seconds.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Upstream account identifier.
pub type AccountId = String;

/// Upstream region name (us-west-2, etc).
pub type RegionName = String;

// ── Partitions ─────────────────────────────────────────────────────

/// An independent unit of collection work: one account in one region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Partition {
    pub account: AccountId,
    pub region: RegionName,
}

impl Partition {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    /// Composite key used for watermarks and the instance-tag cache.
    pub fn scope_key(&self) -> String {
        format!("{}/{}", self.account, self.region)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}

// ── Statistics ─────────────────────────────────────────────────────

/// Aggregation kind requested from the upstream monitoring API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Average,
    Maximum,
    Minimum,
    SampleCount,
    Sum,
}

impl StatKind {
    /// All recognized kinds, in a stable order.
    pub const ALL: [StatKind; 5] = [
        StatKind::Average,
        StatKind::Maximum,
        StatKind::Minimum,
        StatKind::SampleCount,
        StatKind::Sum,
    ];

    /// The upstream API spelling ("Average", "SampleCount", …).
    pub fn api_name(&self) -> &'static str {
        match self {
            StatKind::Average => "Average",
            StatKind::Maximum => "Maximum",
            StatKind::Minimum => "Minimum",
            StatKind::SampleCount => "SampleCount",
            StatKind::Sum => "Sum",
        }
    }

    /// The suffix appended to emitted metric names (".average", …).
    pub fn suffix(&self) -> &'static str {
        match self {
            StatKind::Average => "average",
            StatKind::Maximum => "maximum",
            StatKind::Minimum => "minimum",
            StatKind::SampleCount => "samplecount",
            StatKind::Sum => "sum",
        }
    }

    /// Parse the upstream API spelling.
    pub fn parse_api_name(name: &str) -> Option<StatKind> {
        StatKind::ALL.iter().copied().find(|s| s.api_name() == name)
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

// ── Raw metric data ────────────────────────────────────────────────

/// A key/value attribute attached to a raw metric sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A candidate metric returned by the upstream listing call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateMetric {
    /// Upstream namespace in its original form (e.g. "AWS/EC2").
    pub namespace: String,
    /// Upstream metric name in its original form (e.g. "CPUUtilization").
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
}

impl CandidateMetric {
    /// Key identifying this candidate within a single run, used for
    /// fetch deduplication. Dimension order is normalized.
    pub fn dedup_key(&self) -> String {
        let mut dims: Vec<String> = self
            .dimensions
            .iter()
            .map(|d| format!("{}={}", d.name, d.value))
            .collect();
        dims.sort();
        format!("{}|{}|{}", self.namespace, self.metric_name, dims.join(","))
    }
}

/// One statistic value within a sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StatValue {
    pub kind: StatKind,
    pub value: f64,
}

/// A raw retrieval result: one datapoint for one metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    /// Datapoint timestamp, epoch seconds.
    pub timestamp: u64,
    /// Per-statistic values present in this datapoint.
    pub values: Vec<StatValue>,
}

impl Sample {
    /// Look up the value for a statistic kind, if present.
    pub fn value_for(&self, kind: StatKind) -> Option<f64> {
        self.values.iter().find(|v| v.kind == kind).map(|v| v.value)
    }
}

// ── Output ─────────────────────────────────────────────────────────

/// The final emission unit handed to the output sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputRecord {
    /// Fully assembled metric name (prefix + name + optional stat suffix).
    pub name: String,
    pub value: f64,
    /// Datapoint timestamp, epoch seconds.
    pub timestamp: u64,
    /// The designated origin string for this record.
    pub source: String,
    /// Point tags. Ordered so formatted output is deterministic.
    pub tags: BTreeMap<String, String>,
}
