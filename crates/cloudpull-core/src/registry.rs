//! Metric rule registry.
//!
//! A prioritized, regex-driven rule set decides which raw metric
//! identifiers are collected, which statistics are pulled for each, and
//! how the emitted record is named and attributed. Rules are compiled
//! once at startup into an immutable ordered list; lookups are read-only
//! and safe for unbounded concurrent callers.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::source::SourceDirective;
use crate::types::StatKind;

/// Serde form of a metric rule, as it appears in the `[[rules]]` array of
/// the collector configuration. Declaration order is semantic: it breaks
/// priority ties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSpec {
    /// Regex matched against the lowercase dotted identifier
    /// (`namespace.metric_name`), anchored at the start.
    pub pattern: String,
    /// Upstream API statistic names ("Average", "Sum", …).
    pub stats: Vec<String>,
    /// Lower wins. Ties go to the first-declared rule.
    #[serde(default)]
    pub priority: i64,
    /// Dimension names copied onto the record as point tags.
    #[serde(default)]
    pub dimensions_as_tags: Vec<String>,
    /// Source-resolution directives, in evaluation order.
    #[serde(default)]
    pub source_names: Vec<String>,
    /// Optional upstream listing namespace this rule covers (e.g. "AWS/EC2").
    #[serde(default)]
    pub namespace: Option<String>,
}

/// A compiled metric rule.
#[derive(Debug, Clone)]
pub struct MetricRule {
    /// The original pattern text, for logging and error reporting.
    pub pattern: String,
    compiled: Regex,
    pub stats: Vec<StatKind>,
    pub priority: i64,
    pub dimensions_as_tags: Vec<String>,
    pub source_names: Vec<SourceDirective>,
    pub namespace: Option<String>,
}

impl MetricRule {
    fn compile(spec: &RuleSpec) -> ConfigResult<Self> {
        if spec.stats.is_empty() {
            return Err(ConfigError::EmptyStats {
                pattern: spec.pattern.clone(),
            });
        }

        let mut stats = Vec::with_capacity(spec.stats.len());
        for name in &spec.stats {
            let kind = StatKind::parse_api_name(name).ok_or_else(|| ConfigError::UnknownStat {
                pattern: spec.pattern.clone(),
                stat: name.clone(),
            })?;
            if !stats.contains(&kind) {
                stats.push(kind);
            }
        }

        // Anchored at the start, case-insensitive — identifiers are
        // normalized to lowercase but patterns need not be.
        let compiled = RegexBuilder::new(&format!("^(?:{})", spec.pattern))
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::Pattern {
                pattern: spec.pattern.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            pattern: spec.pattern.clone(),
            compiled,
            stats,
            priority: spec.priority,
            dimensions_as_tags: spec.dimensions_as_tags.clone(),
            source_names: spec
                .source_names
                .iter()
                .map(|s| SourceDirective::parse(s))
                .collect(),
            namespace: spec.namespace.clone(),
        })
    }

    /// Whether this rule's pattern matches an identifier.
    pub fn matches(&self, identifier: &str) -> bool {
        self.compiled.is_match(identifier)
    }
}

/// Immutable ordered list of compiled rules.
///
/// Shared as `Arc<MetricRegistry>` across fetch workers; the read path
/// has no interior mutability.
#[derive(Debug)]
pub struct MetricRegistry {
    rules: Vec<Arc<MetricRule>>,
}

impl MetricRegistry {
    /// Compile a rule set. Fails fast on the first malformed rule.
    pub fn compile(specs: &[RuleSpec]) -> ConfigResult<Self> {
        let rules = specs
            .iter()
            .map(|spec| MetricRule::compile(spec).map(Arc::new))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Normalize an upstream namespace + metric name into the lowercase
    /// dotted identifier rules match against.
    pub fn identifier(namespace: &str, metric_name: &str) -> String {
        format!(
            "{}.{}",
            namespace.to_lowercase().replace('/', "."),
            metric_name.to_lowercase()
        )
    }

    /// Find the governing rule for an identifier: the matching rule with
    /// the lowest priority number, ties broken by declaration order.
    /// `None` means the identifier is not collected (not an error).
    pub fn resolve(&self, identifier: &str) -> Option<Arc<MetricRule>> {
        let mut best: Option<&Arc<MetricRule>> = None;
        for rule in &self.rules {
            if !rule.matches(identifier) {
                continue;
            }
            match best {
                // Strict comparison keeps the first-declared rule on ties.
                Some(current) if rule.priority >= current.priority => {}
                _ => best = Some(rule),
            }
        }
        best.cloned()
    }

    /// Upstream namespaces named by the rule set, used to drive listing.
    pub fn namespaces(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter_map(|r| r.namespace.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(pattern: &str, priority: i64) -> RuleSpec {
        RuleSpec {
            pattern: pattern.to_string(),
            stats: vec!["Average".to_string()],
            priority,
            dimensions_as_tags: vec![],
            source_names: vec![],
            namespace: None,
        }
    }

    #[test]
    fn identifier_normalization() {
        assert_eq!(
            MetricRegistry::identifier("AWS/EC2", "CPUUtilization"),
            "aws.ec2.cpuutilization"
        );
    }

    #[test]
    fn lowest_priority_wins() {
        let registry = MetricRegistry::compile(&[
            spec(r"aws\.ec2\..*", 5),
            spec(r"aws\.ec2\.cpuutilization", 1),
        ])
        .unwrap();

        let rule = registry.resolve("aws.ec2.cpuutilization").unwrap();
        assert_eq!(rule.priority, 1);
    }

    #[test]
    fn ties_go_to_first_declared() {
        let registry = MetricRegistry::compile(&[
            spec(r"aws\.ec2\..*", 3),
            spec(r"aws\.ec2\.cpu.*", 3),
        ])
        .unwrap();

        // Both match with equal priority; declaration order decides, and
        // it decides the same way every time.
        for _ in 0..10 {
            let rule = registry.resolve("aws.ec2.cpuutilization").unwrap();
            assert_eq!(rule.pattern, r"aws\.ec2\..*");
        }
    }

    #[test]
    fn no_match_returns_none() {
        let registry = MetricRegistry::compile(&[spec(r"aws\.ec2\..*", 1)]).unwrap();
        assert!(registry.resolve("aws.sqs.queuedepth").is_none());
    }

    #[test]
    fn pattern_anchored_at_start() {
        let registry = MetricRegistry::compile(&[spec(r"ec2\..*", 1)]).unwrap();
        // Would match in the middle, but not at the start.
        assert!(registry.resolve("aws.ec2.cpuutilization").is_none());
        assert!(registry.resolve("ec2.cpuutilization").is_some());
    }

    #[test]
    fn bad_pattern_fails_compile() {
        let err = MetricRegistry::compile(&[spec(r"aws\.(unclosed", 1)]).unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }

    #[test]
    fn unknown_stat_fails_compile() {
        let mut bad = spec(r"aws\..*", 1);
        bad.stats = vec!["P99".to_string()];
        let err = MetricRegistry::compile(&[bad]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStat { .. }));
    }

    #[test]
    fn empty_stats_fails_compile() {
        let mut bad = spec(r"aws\..*", 1);
        bad.stats = vec![];
        let err = MetricRegistry::compile(&[bad]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyStats { .. }));
    }

    #[test]
    fn duplicate_stats_deduplicated() {
        let mut dup = spec(r"aws\..*", 1);
        dup.stats = vec!["Average".to_string(), "Average".to_string()];
        let registry = MetricRegistry::compile(&[dup]).unwrap();
        let rule = registry.resolve("aws.ec2.x").unwrap();
        assert_eq!(rule.stats, vec![StatKind::Average]);
    }

    #[test]
    fn namespaces_collected_from_rules() {
        let mut a = spec(r"aws\.ec2\..*", 1);
        a.namespace = Some("AWS/EC2".to_string());
        let mut b = spec(r"aws\.elb\..*", 1);
        b.namespace = Some("AWS/ELB".to_string());
        let c = spec(r"custom\..*", 1);

        let registry = MetricRegistry::compile(&[a, b, c]).unwrap();
        let namespaces = registry.namespaces();
        assert_eq!(namespaces.len(), 2);
        assert!(namespaces.contains("AWS/EC2"));
        assert!(namespaces.contains("AWS/ELB"));
    }

    #[test]
    fn source_names_parsed_into_directives() {
        let mut s = spec(r"aws\..*", 1);
        s.source_names = vec!["InstanceId".to_string(), "0".to_string(), "=static".to_string()];
        let registry = MetricRegistry::compile(&[s]).unwrap();
        let rule = registry.resolve("aws.ec2.x").unwrap();
        assert_eq!(
            rule.source_names,
            vec![
                SourceDirective::DimensionKey("InstanceId".to_string()),
                SourceDirective::DimensionIndex(0),
                SourceDirective::Literal("static".to_string()),
            ]
        );
    }
}
