//! Per-partition instance-tag cache.
//!
//! Instance tags change slowly, so they are described at most once per
//! scope per day: a fresh record in the run-state store is reused, a
//! stale or missing one triggers a single upstream describe whose result
//! is persisted for the next run. Concurrent callers for the same scope
//! coalesce onto one in-flight describe.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use cloudpull_core::Partition;
use cloudpull_state::{InstanceTagsRecord, RunStore};

use crate::upstream::InstanceTagProvider;

/// Instance id → tag map for one scope.
pub type TagMap = HashMap<String, HashMap<String, String>>;

pub struct InstanceTagCache {
    store: RunStore,
    provider: Arc<dyn InstanceTagProvider>,
    /// Tag keys to describe; empty disables enrichment entirely.
    tag_keys: Vec<String>,
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<TagMap>>>>>,
}

impl InstanceTagCache {
    pub fn new(
        store: RunStore,
        provider: Arc<dyn InstanceTagProvider>,
        tag_keys: Vec<String>,
    ) -> Self {
        Self {
            store,
            provider,
            tag_keys,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Tags for a partition's instances, or `None` when enrichment is
    /// disabled. Resolves from the in-process cell, then the persisted
    /// cache, then the upstream provider.
    pub async fn tags_for(
        &self,
        partition: &Partition,
        now: u64,
    ) -> anyhow::Result<Option<Arc<TagMap>>> {
        if self.tag_keys.is_empty() {
            return Ok(None);
        }

        let scope = partition.scope_key();
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(scope.clone()).or_default().clone()
        };

        let tags = cell
            .get_or_try_init(|| self.resolve(partition, &scope, now))
            .await?
            .clone();
        Ok(Some(tags))
    }

    async fn resolve(
        &self,
        partition: &Partition,
        scope: &str,
        now: u64,
    ) -> anyhow::Result<Arc<TagMap>> {
        if let Some(record) = self.store.load_instance_tags(scope)? {
            if record.is_fresh(now) {
                debug!(%scope, instances = record.tags.len(), "instance tags from cache");
                return Ok(Arc::new(record.tags));
            }
        }

        let tags = self.provider.describe_tags(partition, &self.tag_keys).await?;
        info!(%scope, instances = tags.len(), "instance tags described");
        self.store.save_instance_tags(
            scope,
            &InstanceTagsRecord {
                tags: tags.clone(),
                fetched_at: now,
            },
        )?;
        Ok(Arc::new(tags))
    }
}
