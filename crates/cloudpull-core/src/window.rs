//! Collection time-window computation.
//!
//! Each run queries a single `[start, end)` interval per partition. The
//! start boundary comes from (in precedence order) an explicit config
//! filter, the persisted watermark of the previous successful run, or a
//! first-run lookback. The upstream API caps a single query at one day,
//! so long windows are split into consecutive sub-windows.

use serde::{Deserialize, Serialize};

/// Maximum span the upstream API accepts for a single statistics query.
pub const MAX_QUERY_SPAN_SECS: u64 = 86_400;

/// Static start/end overrides from configuration. When set, they win over
/// the persisted watermark.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WindowFilter {
    /// Epoch seconds.
    pub start: Option<u64>,
    /// Epoch seconds.
    pub end: Option<u64>,
}

/// The interval a collection run queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start, epoch seconds.
    pub start: u64,
    /// Exclusive end, epoch seconds.
    pub end: u64,
    /// True when no watermark or explicit start existed.
    pub first_run: bool,
}

impl TimeWindow {
    pub fn span_secs(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Split into consecutive sub-windows of at most `max_span` seconds,
    /// in chronological order. A window within the limit yields itself.
    pub fn split(&self, max_span: u64) -> Vec<(u64, u64)> {
        let mut parts = Vec::new();
        let mut start = self.start;
        while start < self.end {
            let end = (start + max_span).min(self.end);
            parts.push((start, end));
            start = end;
        }
        parts
    }
}

/// Compute the window for this run.
///
/// Precedence: explicit filter beats the watermark beats the first-run
/// lookback. `end` defaults to `now`. An empty or inverted window is
/// clamped to one second rather than failing.
pub fn compute_window(
    watermark: Option<u64>,
    filter: &WindowFilter,
    first_run_back_minutes: u64,
    now: u64,
) -> TimeWindow {
    let end = filter.end.unwrap_or(now);

    let (start, first_run) = match (filter.start, watermark) {
        (Some(explicit), _) => (explicit, false),
        (None, Some(mark)) => (mark, false),
        (None, None) => (now.saturating_sub(first_run_back_minutes * 60), true),
    };

    if start >= end {
        return TimeWindow {
            start: end.saturating_sub(1),
            end,
            first_run,
        };
    }

    TimeWindow {
        start,
        end,
        first_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn watermark_becomes_start() {
        let w = compute_window(Some(NOW - 600), &WindowFilter::default(), 5, NOW);
        assert_eq!(w.start, NOW - 600);
        assert_eq!(w.end, NOW);
        assert!(!w.first_run);
    }

    #[test]
    fn first_run_uses_lookback() {
        let w = compute_window(None, &WindowFilter::default(), 5, NOW);
        assert_eq!(w.start, NOW - 300);
        assert_eq!(w.end, NOW);
        assert!(w.first_run);
    }

    #[test]
    fn explicit_filter_beats_watermark() {
        let filter = WindowFilter {
            start: Some(NOW - 7200),
            end: Some(NOW - 3600),
        };
        let w = compute_window(Some(NOW - 60), &filter, 5, NOW);
        assert_eq!(w.start, NOW - 7200);
        assert_eq!(w.end, NOW - 3600);
        assert!(!w.first_run);
    }

    #[test]
    fn compute_is_idempotent_without_save() {
        let a = compute_window(Some(NOW - 600), &WindowFilter::default(), 5, NOW);
        let b = compute_window(Some(NOW - 600), &WindowFilter::default(), 5, NOW);
        assert_eq!(a, b);
    }

    #[test]
    fn inverted_window_clamped_to_one_second() {
        // Watermark ahead of now (clock skew).
        let w = compute_window(Some(NOW + 500), &WindowFilter::default(), 5, NOW);
        assert_eq!(w.end, NOW);
        assert_eq!(w.start, NOW - 1);
        assert!(w.start < w.end);
    }

    #[test]
    fn split_within_limit_is_identity() {
        let w = TimeWindow {
            start: NOW - 3600,
            end: NOW,
            first_run: false,
        };
        assert_eq!(w.split(MAX_QUERY_SPAN_SECS), vec![(NOW - 3600, NOW)]);
    }

    #[test]
    fn thirty_six_hour_window_splits_in_two() {
        let start = NOW - 36 * 3600;
        let w = TimeWindow {
            start,
            end: NOW,
            first_run: false,
        };
        let parts = w.split(MAX_QUERY_SPAN_SECS);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], (start, start + MAX_QUERY_SPAN_SECS));
        assert_eq!(parts[1], (start + MAX_QUERY_SPAN_SECS, NOW));
        // Consecutive and chronological.
        assert_eq!(parts[0].1, parts[1].0);
    }

    #[test]
    fn split_covers_exact_multiples() {
        let start = NOW - 2 * MAX_QUERY_SPAN_SECS;
        let w = TimeWindow {
            start,
            end: NOW,
            first_run: false,
        };
        let parts = w.split(MAX_QUERY_SPAN_SECS);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts.last().unwrap().1, NOW);
    }
}
