//! Sort and merge busy intervals.
//!
//! Sorts intervals by start time (then end time), then merges overlapping or
//! touching intervals into a minimal disjoint set. Both steps are pure: the
//! output depends only on the set of inputs, never on their arrival order.

use crate::interval::BusyInterval;

/// Sort ascending by start, ties broken by end. Duplicates are kept.
pub fn sort_intervals(mut intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    intervals.sort_by_key(|i| (i.start(), i.end()));
    intervals
}

/// Merge overlapping or adjacent busy intervals.
///
/// Returns a sorted list in which, for any two distinct entries `a` before
/// `b`, `a.end < b.start`.
pub fn normalize(intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    let mut merged: Vec<BusyInterval> = Vec::with_capacity(intervals.len());

    for interval in sort_intervals(intervals) {
        if let Some(last) = merged.last_mut() {
            if interval.start() <= last.end() {
                // Overlapping or adjacent -- extend the current interval.
                last.extend_to(interval.end());
                continue;
            }
        }
        merged.push(interval);
    }

    merged
}

/// Whether `instant` falls inside any interval of a normalized list.
///
/// Intervals are treated as half-open `[start, end)`.
pub fn is_busy_at(normalized: &[BusyInterval], instant: chrono::DateTime<chrono::Utc>) -> bool {
    let idx = normalized.partition_point(|i| i.end() <= instant);
    normalized
        .get(idx)
        .is_some_and(|i| i.start() <= instant)
}
