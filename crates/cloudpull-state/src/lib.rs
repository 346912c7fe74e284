//! cloudpull-state — embedded run-state store for cloudpull.
//!
//! Backed by [redb](https://docs.rs/redb), persists the only state the
//! collector carries between runs: per-scope watermarks and the
//! instance-tag cache. Scope keys are `{account}/{region}`.
//!
//! The `RunStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::RunStore;
pub use types::{InstanceTagsRecord, TAG_CACHE_TTL_SECS, WatermarkRecord};
