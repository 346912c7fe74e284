//! File-backed metric source.
//!
//! A JSON fixture stands in for the live monitoring API: it carries the
//! listable metrics with their datapoints plus the instance-tag table.
//! One `ReplaySource` implements all three upstream traits, so a full
//! collection run can execute against a file. Fixture shape:
//!
//! ```json
//! {
//!   "instance_tags": { "i-0abc": { "Name": "web-1" } },
//!   "metrics": [
//!     {
//!       "namespace": "AWS/EC2",
//!       "metric_name": "CPUUtilization",
//!       "dimensions": [ { "name": "InstanceId", "value": "i-0abc" } ],
//!       "datapoints": [
//!         { "timestamp": 1700000000, "values": { "average": 42.5 } }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use cloudpull_core::{CandidateMetric, Dimension, Partition, Sample, StatKind, StatValue};
use cloudpull_engine::{
    FetchError, FetchRequest, InstanceTagProvider, MetricFetcher, MetricLister, TagMap,
};

#[derive(Debug, Deserialize)]
struct ReplayDatapoint {
    timestamp: u64,
    values: HashMap<StatKind, f64>,
}

#[derive(Debug, Deserialize)]
struct ReplayMetric {
    namespace: String,
    metric_name: String,
    #[serde(default)]
    dimensions: Vec<Dimension>,
    #[serde(default)]
    datapoints: Vec<ReplayDatapoint>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaySource {
    #[serde(default)]
    metrics: Vec<ReplayMetric>,
    #[serde(default)]
    instance_tags: TagMap,
}

impl ReplaySource {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

#[async_trait]
impl MetricLister for ReplaySource {
    async fn list(
        &self,
        _partition: &Partition,
        namespace: &str,
    ) -> anyhow::Result<Vec<CandidateMetric>> {
        Ok(self
            .metrics
            .iter()
            .filter(|m| m.namespace == namespace)
            .map(|m| CandidateMetric {
                namespace: m.namespace.clone(),
                metric_name: m.metric_name.clone(),
                dimensions: m.dimensions.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl MetricFetcher for ReplaySource {
    async fn fetch(
        &self,
        _partition: &Partition,
        request: &FetchRequest,
    ) -> Result<Vec<Sample>, FetchError> {
        let Some(metric) = self.metrics.iter().find(|m| {
            m.namespace == request.namespace
                && m.metric_name == request.metric_name
                && m.dimensions == request.dimensions
        }) else {
            return Ok(Vec::new());
        };

        let samples = metric
            .datapoints
            .iter()
            .filter(|dp| dp.timestamp >= request.start && dp.timestamp < request.end)
            .map(|dp| {
                let mut values: Vec<StatValue> = request
                    .stats
                    .iter()
                    .filter_map(|kind| {
                        dp.values
                            .get(kind)
                            .map(|value| StatValue {
                                kind: *kind,
                                value: *value,
                            })
                    })
                    .collect();
                values.sort_by_key(|v| v.kind.api_name());
                Sample {
                    namespace: metric.namespace.clone(),
                    metric_name: metric.metric_name.clone(),
                    dimensions: metric.dimensions.clone(),
                    timestamp: dp.timestamp,
                    values,
                }
            })
            .collect();

        Ok(samples)
    }
}

#[async_trait]
impl InstanceTagProvider for ReplaySource {
    async fn describe_tags(
        &self,
        _partition: &Partition,
        tag_keys: &[String],
    ) -> anyhow::Result<TagMap> {
        let all = tag_keys.iter().any(|k| k == "*");
        Ok(self
            .instance_tags
            .iter()
            .map(|(instance, tags)| {
                let filtered = tags
                    .iter()
                    .filter(|(key, _)| all || tag_keys.contains(key))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                (instance.clone(), filtered)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "instance_tags": {
            "i-0abc": { "Name": "web-1", "team": "infra" }
        },
        "metrics": [
            {
                "namespace": "AWS/EC2",
                "metric_name": "CPUUtilization",
                "dimensions": [ { "name": "InstanceId", "value": "i-0abc" } ],
                "datapoints": [
                    { "timestamp": 1000, "values": { "average": 40.0, "maximum": 90.0 } },
                    { "timestamp": 2000, "values": { "average": 50.0 } }
                ]
            },
            {
                "namespace": "AWS/ELB",
                "metric_name": "RequestCount",
                "dimensions": [ { "name": "LoadBalancerName", "value": "elb-prod" } ],
                "datapoints": []
            }
        ]
    }"#;

    fn partition() -> Partition {
        Partition::new("123", "us-west-2")
    }

    fn request(start: u64, end: u64, stats: Vec<StatKind>) -> FetchRequest {
        FetchRequest {
            namespace: "AWS/EC2".to_string(),
            metric_name: "CPUUtilization".to_string(),
            dimensions: vec![Dimension::new("InstanceId", "i-0abc")],
            stats,
            start,
            end,
            period_secs: 60,
        }
    }

    #[tokio::test]
    async fn listing_filters_by_namespace() {
        let source = ReplaySource::from_json(FIXTURE).unwrap();
        let ec2 = source.list(&partition(), "AWS/EC2").await.unwrap();
        assert_eq!(ec2.len(), 1);
        assert_eq!(ec2[0].metric_name, "CPUUtilization");

        let sqs = source.list(&partition(), "AWS/SQS").await.unwrap();
        assert!(sqs.is_empty());
    }

    #[tokio::test]
    async fn fetch_respects_window_bounds() {
        let source = ReplaySource::from_json(FIXTURE).unwrap();
        // End is exclusive; the 2000 datapoint is outside.
        let samples = source
            .fetch(&partition(), &request(1000, 2000, vec![StatKind::Average]))
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp, 1000);
    }

    #[tokio::test]
    async fn fetch_returns_only_requested_stats() {
        let source = ReplaySource::from_json(FIXTURE).unwrap();
        let samples = source
            .fetch(&partition(), &request(0, 1500, vec![StatKind::Maximum]))
            .await
            .unwrap();
        assert_eq!(samples[0].values.len(), 1);
        assert_eq!(samples[0].values[0].kind, StatKind::Maximum);
        assert_eq!(samples[0].values[0].value, 90.0);
    }

    #[tokio::test]
    async fn unknown_metric_fetches_empty() {
        let source = ReplaySource::from_json(FIXTURE).unwrap();
        let mut req = request(0, 5000, vec![StatKind::Average]);
        req.metric_name = "DiskReadOps".to_string();
        let samples = source.fetch(&partition(), &req).await.unwrap();
        assert!(samples.is_empty());
    }

    #[tokio::test]
    async fn tag_keys_filter_described_tags() {
        let source = ReplaySource::from_json(FIXTURE).unwrap();
        let tags = source
            .describe_tags(&partition(), &["Name".to_string()])
            .await
            .unwrap();
        assert_eq!(tags["i-0abc"].len(), 1);
        assert_eq!(tags["i-0abc"]["Name"], "web-1");
    }

    #[tokio::test]
    async fn star_describes_all_tags() {
        let source = ReplaySource::from_json(FIXTURE).unwrap();
        let tags = source
            .describe_tags(&partition(), &["*".to_string()])
            .await
            .unwrap();
        assert_eq!(tags["i-0abc"].len(), 2);
    }

    #[test]
    fn malformed_fixture_rejected() {
        assert!(ReplaySource::from_json("{ not json").is_err());
    }

    #[tokio::test]
    async fn fixture_drives_a_full_collection_run() {
        use std::sync::Arc;

        use cloudpull_core::{MetricRegistry, RuleSpec, WindowFilter};
        use cloudpull_engine::{
            CollectingSink, CollectionRun, EmitOptions, FetchScheduler, InstanceTagCache,
            PartitionPlan, RunOptions,
        };
        use cloudpull_state::RunStore;
        use tokio::sync::watch;

        let source = Arc::new(ReplaySource::from_json(FIXTURE).unwrap());
        let store = RunStore::open_in_memory().unwrap();
        let sink = Arc::new(CollectingSink::new());
        let registry = Arc::new(
            MetricRegistry::compile(&[RuleSpec {
                pattern: r"aws\.ec2\.cpuutilization".to_string(),
                stats: vec!["Average".to_string(), "Maximum".to_string()],
                priority: 0,
                dimensions_as_tags: vec!["InstanceId".to_string()],
                source_names: vec![],
                namespace: Some("AWS/EC2".to_string()),
            }])
            .unwrap(),
        );

        let run = CollectionRun::new(
            registry,
            source.clone(),
            FetchScheduler::new(source.clone()),
            InstanceTagCache::new(store.clone(), source, vec!["Name".to_string()]),
            sink.clone(),
            store.clone(),
            RunOptions {
                emit: EmitOptions::new("aws", "", true),
                filter: WindowFilter::default(),
                first_run_back_minutes: 50,
            },
        );

        // First run: lookback of 50 min from now=3000 covers both
        // fixture datapoints (1000 and 2000).
        let now = 3000;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let summary = run
            .execute_at(
                vec![PartitionPlan {
                    partition: partition(),
                    workers: 4,
                }],
                cancel_rx,
                now,
            )
            .await
            .unwrap();
        drop(cancel_tx);

        // CPUUtilization matched; the ELB metric's namespace is not
        // listed by the rule set.
        assert_eq!(summary.candidates, 1);
        assert_eq!(summary.fetched_metrics, 1);
        assert_eq!(summary.failed_partitions, 0);
        // Both stats at ts 1000, average only at ts 2000.
        assert_eq!(summary.emitted_records, 3);

        let records = sink.records().await;
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"aws.ec2.cpuutilization.average"));
        assert!(names.contains(&"aws.ec2.cpuutilization.maximum"));
        for record in &records {
            assert_eq!(record.source, "i-0abc");
            assert_eq!(record.tags.get("Name").unwrap(), "web-1");
            assert_eq!(record.tags.get("InstanceId").unwrap(), "i-0abc");
            assert_eq!(record.tags.get("region").unwrap(), "us-west-2");
        }

        let mark = store.load_watermark("123/us-west-2").unwrap().unwrap();
        assert_eq!(mark.end, now);
    }
}
