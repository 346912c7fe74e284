//! Engine error types.

use thiserror::Error;

/// Errors returned by a `MetricFetcher` implementation. The scheduler
/// owns the retry policy: transient errors are retried with backoff,
/// fatal errors fail that metric immediately.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network hiccup, throttling, connection reset — worth retrying.
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// Authorization or validation failure — retrying cannot help.
    #[error("fatal fetch error: {0}")]
    Fatal(String),
}

/// Errors that can occur while running a collection.
#[derive(Debug, Error)]
pub enum EngineError {
    /// One metric's data for this run is lost. Reported on the outcome
    /// stream; sibling metrics continue.
    #[error("metric {identifier} failed: {reason}")]
    Metric { identifier: String, reason: String },

    /// Upstream listing failed for a partition; that partition is failed
    /// and retries the same window next run.
    #[error("listing failed: {0}")]
    Listing(String),

    /// Every partition failed; the run is failed and no watermark moves.
    #[error("all {failed} partitions failed")]
    AllPartitionsFailed { failed: usize },

    /// The output sink rejected a write. Aborts the run so the window is
    /// not marked collected with data missing downstream.
    #[error("output sink error: {0}")]
    Sink(String),

    #[error("state store error: {0}")]
    State(#[from] cloudpull_state::StateError),
}

pub type EngineResult<T> = Result<T, EngineError>;
