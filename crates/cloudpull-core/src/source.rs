//! Source-resolution cascade.
//!
//! Every emitted record carries a single "source" string. It is chosen by
//! evaluating a rule's source directives in order against the sample's
//! point tags and dimensions; the first directive producing a non-blank
//! value wins. When the rule provides no directives (or all of them come
//! up blank), a built-in default cascade is consulted before giving up.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::Dimension;

/// Well-known dimension keys tried when a rule's own directives resolve
/// nothing. The sample's namespace is the last-resort literal after these.
pub const DEFAULT_SOURCE_KEYS: [&str; 5] =
    ["InstanceId", "Host", "host", "Service", "LoadBalancerName"];

/// A single step of the source-resolution cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDirective {
    /// Look up a dimension (or already-materialized point tag) by name.
    DimensionKey(String),
    /// Look up the dimension at this 0-based position, ignoring names.
    DimensionIndex(usize),
    /// A fixed string (configured with a leading `=`).
    Literal(String),
}

impl SourceDirective {
    /// Parse the configuration text form of a directive:
    /// `=value` is a literal, an all-digit token is a dimension index,
    /// anything else is a dimension key.
    pub fn parse(text: &str) -> SourceDirective {
        if let Some(literal) = text.strip_prefix('=') {
            SourceDirective::Literal(literal.to_string())
        } else if let Ok(index) = text.parse::<usize>() {
            SourceDirective::DimensionIndex(index)
        } else {
            SourceDirective::DimensionKey(text.to_string())
        }
    }

    /// Evaluate this directive. Returns `None` when it yields nothing
    /// usable (missing key, out-of-range index, blank value).
    fn evaluate(
        &self,
        dimensions: &[Dimension],
        tags: &BTreeMap<String, String>,
    ) -> Option<String> {
        let value = match self {
            SourceDirective::Literal(value) => Some(value.clone()),
            SourceDirective::DimensionIndex(index) => {
                dimensions.get(*index).map(|d| d.value.clone())
            }
            SourceDirective::DimensionKey(key) => tags
                .get(key)
                .cloned()
                .or_else(|| {
                    dimensions
                        .iter()
                        .find(|d| &d.name == key)
                        .map(|d| d.value.clone())
                }),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// No directive (including the defaults) produced a usable source.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no source directive yielded a value (tried {tried} directives)")]
pub struct SourceError {
    pub tried: usize,
}

/// Resolve the source for a sample.
///
/// `directives` is the rule's configured cascade (may be empty);
/// `namespace` is the sample's namespace, used as the last-resort literal.
/// First non-blank wins; later directives are not evaluated.
pub fn resolve_source(
    directives: &[SourceDirective],
    dimensions: &[Dimension],
    tags: &BTreeMap<String, String>,
    namespace: &str,
) -> Result<String, SourceError> {
    let mut tried = 0;

    for directive in directives {
        tried += 1;
        if let Some(value) = directive.evaluate(dimensions, tags) {
            return Ok(value);
        }
    }

    for key in DEFAULT_SOURCE_KEYS {
        tried += 1;
        let directive = SourceDirective::DimensionKey(key.to_string());
        if let Some(value) = directive.evaluate(dimensions, tags) {
            return Ok(value);
        }
    }

    tried += 1;
    if !namespace.trim().is_empty() {
        return Ok(namespace.to_string());
    }

    Err(SourceError { tried })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Vec<Dimension> {
        vec![
            Dimension::new("LoadBalancerName", "elb-prod"),
            Dimension::new("AvailabilityZone", "us-west-2a"),
        ]
    }

    fn no_tags() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn parse_literal_index_key() {
        assert_eq!(
            SourceDirective::parse("=fixed"),
            SourceDirective::Literal("fixed".to_string())
        );
        assert_eq!(SourceDirective::parse("1"), SourceDirective::DimensionIndex(1));
        assert_eq!(
            SourceDirective::parse("InstanceId"),
            SourceDirective::DimensionKey("InstanceId".to_string())
        );
    }

    #[test]
    fn first_non_blank_wins() {
        let directives = vec![
            SourceDirective::DimensionKey("Missing".to_string()),
            SourceDirective::DimensionKey("LoadBalancerName".to_string()),
            SourceDirective::Literal("never-reached".to_string()),
        ];
        let source = resolve_source(&directives, &dims(), &no_tags(), "aws/elb").unwrap();
        assert_eq!(source, "elb-prod");
    }

    #[test]
    fn point_tags_consulted_before_dimensions() {
        let mut tags = BTreeMap::new();
        tags.insert("LoadBalancerName".to_string(), "from-tag".to_string());
        let directives = vec![SourceDirective::DimensionKey("LoadBalancerName".to_string())];
        let source = resolve_source(&directives, &dims(), &tags, "aws/elb").unwrap();
        assert_eq!(source, "from-tag");
    }

    #[test]
    fn index_directive_is_zero_based() {
        let directives = vec![SourceDirective::DimensionIndex(1)];
        let source = resolve_source(&directives, &dims(), &no_tags(), "aws/elb").unwrap();
        assert_eq!(source, "us-west-2a");
    }

    #[test]
    fn out_of_range_index_skipped() {
        let directives = vec![
            SourceDirective::DimensionIndex(9),
            SourceDirective::Literal("fallback".to_string()),
        ];
        let source = resolve_source(&directives, &dims(), &no_tags(), "aws/elb").unwrap();
        assert_eq!(source, "fallback");
    }

    #[test]
    fn blank_values_do_not_win() {
        let dims = vec![Dimension::new("Host", "   ")];
        let directives = vec![
            SourceDirective::DimensionKey("Host".to_string()),
            SourceDirective::Literal("real".to_string()),
        ];
        let source = resolve_source(&directives, &dims, &no_tags(), "aws/ec2").unwrap();
        assert_eq!(source, "real");
    }

    #[test]
    fn empty_directives_fall_back_to_defaults() {
        let dims = vec![Dimension::new("InstanceId", "i-abc123")];
        let source = resolve_source(&[], &dims, &no_tags(), "aws/ec2").unwrap();
        assert_eq!(source, "i-abc123");
    }

    #[test]
    fn namespace_is_last_resort() {
        let source = resolve_source(&[], &[], &no_tags(), "aws/sqs").unwrap();
        assert_eq!(source, "aws/sqs");
    }

    #[test]
    fn exhausted_cascade_fails() {
        let err = resolve_source(&[], &[], &no_tags(), "").unwrap_err();
        assert!(err.tried > 0);
    }
}
