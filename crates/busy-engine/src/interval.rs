//! Busy intervals and the query window they are built against.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{CalendarError, Result};

/// The caller's range of interest. `start < end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct QueryWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl QueryWindow {
    /// # Errors
    /// Returns [`CalendarError::InvalidWindow`] unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(CalendarError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// A window of `length` beginning at `start`.
    ///
    /// # Errors
    /// Returns [`CalendarError::InvalidWindow`] for a non-positive length, or
    /// one that runs past the last representable instant.
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Result<Self> {
        let end = start
            .checked_add_signed(length)
            .ok_or(CalendarError::InvalidWindow {
                start,
                end: DateTime::<Utc>::MAX_UTC,
            })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Inclusive at both boundaries: an interval that ends exactly at the
    /// window start, or starts exactly at the window end, still overlaps.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        end >= self.start && start <= self.end
    }
}

/// An opaque busy period. Carries no trace of the event that produced it.
///
/// Serializes as `{"start": "<ISO-8601>", "end": "<ISO-8601>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BusyInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl BusyInterval {
    /// Returns `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub(crate) fn extend_to(&mut self, end: DateTime<Utc>) {
        self.end = self.end.max(end);
    }
}

/// The busy interval of one occurrence, if it overlaps `window`.
///
/// The interval keeps its full extent; it is never clipped to the window.
pub fn occurrence_interval(
    start: DateTime<Utc>,
    duration: Duration,
    window: &QueryWindow,
) -> Option<BusyInterval> {
    let end = start.checked_add_signed(duration)?;
    if !window.overlaps(start, end) {
        return None;
    }
    BusyInterval::new(start, end)
}

/// Pair every occurrence start with `duration` and keep those overlapping
/// `window`.
pub fn build_intervals<'w, I>(
    starts: I,
    duration: Duration,
    window: &'w QueryWindow,
) -> impl Iterator<Item = BusyInterval> + 'w
where
    I: IntoIterator<Item = DateTime<Utc>>,
    I::IntoIter: 'w,
{
    starts
        .into_iter()
        .filter_map(move |start| occurrence_interval(start, duration, window))
}
