//! Record emission.
//!
//! Pure transformation from a fetched sample plus its governing rule into
//! zero or more output records. One record per statistic the rule asked
//! for and the sample actually carries. The emitted name is the lowercase
//! dotted identifier with the vendor prefix rewritten to the configured
//! output namespace, an optional global prefix in front, and the
//! statistic suffix behind (omitted only for single-statistic rules when
//! the suffix flag is off).

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use cloudpull_core::{
    MetricRule, OutputRecord, Partition, Sample, SourceError, resolve_source,
};

/// Emission knobs lifted from the collector configuration.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Output namespace the vendor `aws` prefix is rewritten to.
    pub namespace: String,
    /// Prefix prepended verbatim to every emitted name.
    pub metric_name_prefix: String,
    /// When a rule requests a single statistic, still append its suffix.
    pub single_stat_has_suffix: bool,
}

impl EmitOptions {
    pub fn new(
        namespace: impl Into<String>,
        metric_name_prefix: impl Into<String>,
        single_stat_has_suffix: bool,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            metric_name_prefix: metric_name_prefix.into(),
            single_stat_has_suffix,
        }
    }
}

/// Build the emitted base name (before the statistic suffix) for a sample.
fn display_name(sample: &Sample, options: &EmitOptions) -> String {
    let mut namespace = sample.namespace.to_lowercase();
    if let Some(rest) = namespace.strip_prefix("aws/") {
        namespace = format!("{}/{}", options.namespace, rest);
    }
    format!(
        "{}{}.{}",
        options.metric_name_prefix,
        namespace.replace('/', "."),
        sample.metric_name.to_lowercase()
    )
}

/// Emit the records for one sample under its governing rule.
///
/// `instance_tags` maps instance id → tag map from the instance-tag
/// cache; a sample is enriched when its `InstanceId` dimension matches a
/// cached instance. Fails only when no source can be resolved, in which
/// case the whole sample is dropped.
pub fn emit(
    rule: &MetricRule,
    sample: &Sample,
    partition: &Partition,
    instance_tags: Option<&HashMap<String, HashMap<String, String>>>,
    options: &EmitOptions,
) -> Result<Vec<OutputRecord>, SourceError> {
    let mut tags: BTreeMap<String, String> = BTreeMap::new();
    tags.insert("region".to_string(), partition.region.clone());
    tags.insert("accountId".to_string(), partition.account.clone());

    for name in &rule.dimensions_as_tags {
        if let Some(dim) = sample.dimensions.iter().find(|d| &d.name == name) {
            tags.insert(dim.name.clone(), dim.value.clone());
        }
    }

    if let Some(cache) = instance_tags {
        if let Some(instance_id) = sample
            .dimensions
            .iter()
            .find(|d| d.name == "InstanceId")
            .map(|d| d.value.as_str())
        {
            match cache.get(instance_id) {
                Some(extra) => {
                    for (key, value) in extra {
                        tags.insert(key.clone(), value.clone());
                    }
                }
                None => {
                    debug!(instance_id, "instance not in tag cache");
                }
            }
        }
    }

    let source = resolve_source(
        &rule.source_names,
        &sample.dimensions,
        &tags,
        &sample.namespace,
    )?;

    let base_name = display_name(sample, options);
    let with_suffix = rule.stats.len() > 1 || options.single_stat_has_suffix;

    let mut records = Vec::new();
    for stat in &rule.stats {
        let Some(value) = sample.value_for(*stat) else {
            continue;
        };
        let name = if with_suffix {
            format!("{}.{}", base_name, stat.suffix())
        } else {
            base_name.clone()
        };
        records.push(OutputRecord {
            name,
            value,
            timestamp: sample.timestamp,
            source: source.clone(),
            tags: tags.clone(),
        });
    }

    Ok(records)
}
