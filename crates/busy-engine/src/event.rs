//! Event definitions: the only part of a calendar entry the engine keeps.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::rule::RuleSource;
use crate::timezone::TimeBasis;

/// Start, end and recurrence of one calendar entry. Titles, descriptions,
/// attendees and every other field are dropped at parse time.
///
/// Invariant: `end > start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDefinition {
    /// Start instant.
    pub start: DateTime<Utc>,
    /// End instant of the first occurrence.
    pub end: DateTime<Utc>,
    /// Start as written in the feed; recurrences are stepped in this clock.
    pub wall_start: NaiveDateTime,
    pub basis: TimeBasis,
    pub recurrence: Option<RuleSource>,
    /// Dates whose occurrences are dropped (matched on the UTC date).
    pub exclusion_dates: BTreeSet<NaiveDate>,
}

impl EventDefinition {
    /// A UTC-anchored, non-recurring definition. `None` unless `start < end`.
    pub fn utc(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then(|| Self {
            start,
            end,
            wall_start: start.naive_utc(),
            basis: TimeBasis::Utc,
            recurrence: None,
            exclusion_dates: BTreeSet::new(),
        })
    }

    #[must_use]
    pub fn with_recurrence(mut self, source: RuleSource) -> Self {
        self.recurrence = Some(source);
        self
    }

    #[must_use]
    pub fn with_exclusion(mut self, date: NaiveDate) -> Self {
        self.exclusion_dates.insert(date);
        self
    }

    /// Length of every occurrence.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// The start carried neither a `Z` suffix nor a `TZID`.
    pub fn is_floating(&self) -> bool {
        self.basis == TimeBasis::Floating
    }
}
