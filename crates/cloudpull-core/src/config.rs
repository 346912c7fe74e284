//! Collector configuration (TOML).
//!
//! One file carries the proxy endpoint, collector behavior, the account/
//! region layout, optional per-region overrides, and the ordered rule set.
//! Rules are an array of tables so their declaration order is preserved —
//! it breaks priority ties during resolution.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::registry::RuleSpec;
use crate::types::Partition;
use crate::window::WindowFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub collector: CollectorSettings,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub region_overrides: Vec<RegionOverride>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

/// Downstream proxy endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Print would-be output instead of opening a socket.
    #[serde(default)]
    pub dry_run: bool,
}

/// Collector behavior knobs, with per-region overrides layered on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    /// Output namespace the upstream vendor prefix is rewritten to.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Bounded worker-pool size per partition.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// When a rule requests a single statistic, still append its suffix.
    #[serde(default = "default_true")]
    pub single_stat_has_suffix: bool,
    /// Lookback for the very first run (no watermark yet).
    #[serde(default = "default_back_minutes")]
    pub first_run_back_minutes: u64,
    /// Prefix prepended to every emitted metric name.
    #[serde(default)]
    pub metric_name_prefix: String,
    /// Instance tag keys to enrich records with ("*" = all).
    #[serde(default)]
    pub ec2_tag_keys: Vec<String>,
    /// Explicit window start override, epoch seconds.
    #[serde(default)]
    pub start_time: Option<u64>,
    /// Explicit window end override, epoch seconds.
    #[serde(default)]
    pub end_time: Option<u64>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            workers: default_workers(),
            single_stat_has_suffix: true,
            first_run_back_minutes: default_back_minutes(),
            metric_name_prefix: String::new(),
            ec2_tag_keys: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Upstream account id.
    pub id: String,
    pub regions: Vec<String>,
}

/// Per-region tweaks layered over `[collector]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionOverride {
    pub region: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_namespace() -> String {
    "aws".to_string()
}

fn default_workers() -> usize {
    10
}

fn default_back_minutes() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl CollectorConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Enabled (account, region) partitions, in declaration order.
    pub fn partitions(&self) -> Vec<Partition> {
        self.accounts
            .iter()
            .flat_map(|account| {
                account
                    .regions
                    .iter()
                    .filter(|region| self.region_enabled(region))
                    .map(|region| Partition::new(account.id.clone(), region.clone()))
            })
            .collect()
    }

    pub fn region_enabled(&self, region: &str) -> bool {
        self.region_overrides
            .iter()
            .find(|o| o.region == region)
            .map(|o| o.enabled)
            .unwrap_or(true)
    }

    /// Worker-pool size for a region, honoring the override.
    pub fn workers_for(&self, region: &str) -> usize {
        self.region_overrides
            .iter()
            .find(|o| o.region == region)
            .and_then(|o| o.workers)
            .unwrap_or(self.collector.workers)
            .max(1)
    }

    pub fn window_filter(&self) -> WindowFilter {
        WindowFilter {
            start: self.collector.start_time,
            end: self.collector.end_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[proxy]
host = "127.0.0.1"
port = 2878
"#;

    const FULL: &str = r#"
[proxy]
host = "proxy.internal"
port = 2878
dry_run = true

[collector]
namespace = "aws"
workers = 16
single_stat_has_suffix = false
first_run_back_minutes = 10
metric_name_prefix = "cloud."
ec2_tag_keys = ["Name", "team"]

[[accounts]]
id = "123456789012"
regions = ["us-west-2", "us-east-1"]

[[accounts]]
id = "210987654321"
regions = ["eu-west-1"]

[[region_overrides]]
region = "us-east-1"
enabled = false

[[region_overrides]]
region = "us-west-2"
workers = 4

[[rules]]
pattern = 'aws\.ec2\..*'
stats = ["Average", "Maximum"]
priority = 5
source_names = ["InstanceId"]
dimensions_as_tags = ["InstanceId"]
namespace = "AWS/EC2"

[[rules]]
pattern = 'aws\.ec2\.cpuutilization'
stats = ["Average"]
priority = 1
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = CollectorConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.collector.workers, 10);
        assert!(config.collector.single_stat_has_suffix);
        assert_eq!(config.collector.first_run_back_minutes, 5);
        assert_eq!(config.collector.namespace, "aws");
        assert!(config.rules.is_empty());
        assert!(config.partitions().is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = CollectorConfig::from_toml(FULL).unwrap();
        assert!(config.proxy.dry_run);
        assert_eq!(config.collector.metric_name_prefix, "cloud.");
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].priority, 5);
        assert_eq!(config.rules[1].priority, 1);
    }

    #[test]
    fn rule_declaration_order_preserved() {
        let config = CollectorConfig::from_toml(FULL).unwrap();
        assert_eq!(config.rules[0].pattern, r"aws\.ec2\..*");
        assert_eq!(config.rules[1].pattern, r"aws\.ec2\.cpuutilization");
    }

    #[test]
    fn disabled_region_excluded_from_partitions() {
        let config = CollectorConfig::from_toml(FULL).unwrap();
        let partitions = config.partitions();
        assert_eq!(partitions.len(), 2);
        assert!(
            partitions
                .iter()
                .all(|p| p.region != "us-east-1")
        );
    }

    #[test]
    fn worker_override_applies() {
        let config = CollectorConfig::from_toml(FULL).unwrap();
        assert_eq!(config.workers_for("us-west-2"), 4);
        assert_eq!(config.workers_for("eu-west-1"), 16);
    }

    #[test]
    fn window_filter_from_settings() {
        let mut config = CollectorConfig::from_toml(MINIMAL).unwrap();
        config.collector.start_time = Some(1000);
        let filter = config.window_filter();
        assert_eq!(filter.start, Some(1000));
        assert_eq!(filter.end, None);
    }

    #[test]
    fn garbage_fails_to_parse() {
        assert!(matches!(
            CollectorConfig::from_toml("not toml ["),
            Err(ConfigError::Parse(_))
        ));
    }
}
