//! Persisted record types for the run-state store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Instance-tag cache entries become stale after one day.
pub const TAG_CACHE_TTL_SECS: u64 = 86_400;

/// The end timestamp of the last fully successful run for one scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatermarkRecord {
    /// Window end of the last successful run, epoch seconds.
    pub end: u64,
    /// When this record was written, epoch seconds.
    pub saved_at: u64,
}

/// Cached instance tags for one scope: instance id → tag map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceTagsRecord {
    pub tags: HashMap<String, HashMap<String, String>>,
    /// When the upstream describe call ran, epoch seconds.
    pub fetched_at: u64,
}

impl InstanceTagsRecord {
    /// Whether this record is still within the freshness window.
    pub fn is_fresh(&self, now: u64) -> bool {
        now.saturating_sub(self.fetched_at) < TAG_CACHE_TTL_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_boundary() {
        let record = InstanceTagsRecord {
            tags: HashMap::new(),
            fetched_at: 1000,
        };
        assert!(record.is_fresh(1000));
        assert!(record.is_fresh(1000 + TAG_CACHE_TTL_SECS - 1));
        assert!(!record.is_fresh(1000 + TAG_CACHE_TTL_SECS));
    }
}
