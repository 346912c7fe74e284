//! RunStore — redb-backed persistence for cross-run collector state.
//!
//! Two concerns survive between runs: the per-scope watermark (the end of
//! the last fully successful window) and the per-scope instance-tag
//! cache. Values are JSON-serialized into redb's `&[u8]` value columns.
//! The store supports both on-disk and in-memory backends (the latter
//! for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::{INSTANCE_TAGS, WATERMARKS};
use crate::types::{InstanceTagsRecord, WatermarkRecord};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe run-state store backed by redb.
#[derive(Clone)]
pub struct RunStore {
    db: Arc<Database>,
}

impl RunStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "run-state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing and dry runs).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory run-state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WATERMARKS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCE_TAGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Watermarks ─────────────────────────────────────────────────

    /// Load the persisted watermark for a scope, if any.
    pub fn load_watermark(&self, scope: &str) -> StateResult<Option<WatermarkRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WATERMARKS).map_err(map_err!(Table))?;
        match table.get(scope).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: WatermarkRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Persist the watermark for a scope. Called once per successful run.
    pub fn save_watermark(&self, scope: &str, record: &WatermarkRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WATERMARKS).map_err(map_err!(Table))?;
            table
                .insert(scope, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%scope, end = record.end, "watermark saved");
        Ok(())
    }

    // ── Instance-tag cache ─────────────────────────────────────────

    /// Load the cached instance tags for a scope, if any.
    pub fn load_instance_tags(&self, scope: &str) -> StateResult<Option<InstanceTagsRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCE_TAGS).map_err(map_err!(Table))?;
        match table.get(scope).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: InstanceTagsRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Persist the instance tags for a scope.
    pub fn save_instance_tags(&self, scope: &str, record: &InstanceTagsRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCE_TAGS).map_err(map_err!(Table))?;
            table
                .insert(scope, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%scope, instances = record.tags.len(), "instance tags cached");
        Ok(())
    }
}
