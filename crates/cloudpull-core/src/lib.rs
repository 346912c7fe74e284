//! cloudpull-core — domain types and the metric resolution algorithms.
//!
//! The pieces here are pure and synchronous: rule matching, source
//! resolution, and time-window arithmetic have no I/O and no interior
//! mutability, so the engine can share them freely across workers.
//!
//! # Architecture
//!
//! ```text
//! CollectorConfig (TOML)
//!   ├── RuleSpec[]  ──compile──▶ MetricRegistry (ordered, immutable)
//!   │                              └── resolve(identifier) → MetricRule
//!   ├── WindowFilter ──▶ compute_window(watermark, filter, …) → TimeWindow
//!   └── source_names ──▶ resolve_source(directives, dims, tags) → source
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod source;
pub mod types;
pub mod window;

pub use config::CollectorConfig;
pub use error::{ConfigError, ConfigResult};
pub use registry::{MetricRegistry, MetricRule, RuleSpec};
pub use source::{SourceDirective, SourceError, resolve_source};
pub use types::*;
pub use window::{MAX_QUERY_SPAN_SECS, TimeWindow, WindowFilter, compute_window};
