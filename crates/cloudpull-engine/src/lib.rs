//! cloudpull-engine — the collection pipeline.
//!
//! ```text
//!            ┌───────────────┐
//!   rules ──▶│ MetricRegistry │── resolve ──┐
//!            └───────────────┘              ▼
//!   MetricLister ── candidates ──▶ ┌────────────────┐
//!                                  │ FetchScheduler │── samples ──┐
//!   MetricFetcher ◀── bounded ─────└────────────────┘             ▼
//!                                                           ┌──────────┐
//!   InstanceTagCache ── enrichment ────────────────────────▶│ emitter  │
//!                                                           └────┬─────┘
//!                                                                ▼
//!                                                           OutputSink
//! ```
//!
//! `CollectionRun` wires these together for one run; the upstream traits
//! in [`upstream`] are the only seams to the outside world.

pub mod emitter;
pub mod error;
pub mod run;
pub mod scheduler;
pub mod sink;
pub mod tags;
pub mod upstream;

pub use emitter::{EmitOptions, emit};
pub use error::{EngineError, EngineResult, FetchError};
pub use run::{CollectionRun, PartitionPlan, RunOptions, RunSummary, epoch_secs};
pub use scheduler::{FetchOutcome, FetchScheduler, PartitionWork, ResolvedMetric};
pub use sink::{CollectingSink, DryRunSink, OutputSink, ProxySink, format_line};
pub use tags::{InstanceTagCache, TagMap};
pub use upstream::{
    DEFAULT_PERIOD_SECS, FetchRequest, InstanceTagProvider, MetricFetcher, MetricLister,
};
