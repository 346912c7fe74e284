//! redb table definitions for the run-state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized
//! records). Keys are partition scope keys, `{account}/{region}`.

use redb::TableDefinition;

/// Watermark records keyed by `{account}/{region}`.
pub const WATERMARKS: TableDefinition<&str, &[u8]> = TableDefinition::new("watermarks");

/// Instance-tag cache records keyed by `{account}/{region}`.
pub const INSTANCE_TAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("instance_tags");
