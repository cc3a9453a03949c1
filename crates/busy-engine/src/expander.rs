//! Recurrence expansion -- turns a [`RecurrenceRule`] anchored at an event's
//! start into concrete occurrence instants.
//!
//! The `rrule` crate generates the raw sequence on the event's wall-clock
//! time (built as if it were UTC), and each result is mapped to a real
//! instant through the event's [`Zone`]. A 09:00 meeting therefore stays at
//! 09:00 local across a DST change without any timezone database.
//! [`Schedule`] owns the built rule set, [`Occurrences`] walks it lazily and
//! [`expand`] collects the walk and applies exclusion dates.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rrule::{RRuleSet, Tz};

use crate::error::RecurrenceError;
use crate::interval::QueryWindow;
use crate::rule::{Frequency, RecurrenceRule};
use crate::timezone::Zone;

/// Maximum number of raw occurrences a rule may generate without
/// terminating.
pub const DEFAULT_ITERATION_CEILING: u32 = 100_000;

/// A rule bound to its first occurrence, ready to be walked.
#[derive(Debug, Clone)]
pub struct Schedule<'z> {
    set: RRuleSet,
    zone: Zone<'z>,
    until: Option<DateTime<Utc>>,
    horizon: DateTime<Utc>,
    ceiling: u32,
}

impl<'z> Schedule<'z> {
    /// Schedule `rule` from `anchor` (wall-clock in `zone`), up to and
    /// including `horizon`.
    ///
    /// # Errors
    /// Returns [`RecurrenceError::InvalidRule`] when `rrule` refuses the
    /// combination of parts (e.g. `BYWEEKNO` outside a yearly rule).
    pub fn new(
        rule: &RecurrenceRule,
        anchor: NaiveDateTime,
        zone: Zone<'z>,
        horizon: DateTime<Utc>,
    ) -> Result<Self, RecurrenceError> {
        let set = rule
            .to_rrule()?
            .build(anchor.and_utc().with_timezone(&Tz::UTC))
            .map_err(|e| RecurrenceError::InvalidRule(e.to_string()))?;
        Ok(Self {
            set,
            zone,
            until: rule.until,
            horizon,
            ceiling: DEFAULT_ITERATION_CEILING,
        })
    }

    #[must_use]
    pub fn with_ceiling(mut self, ceiling: u32) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn occurrences(&self) -> Occurrences<'_> {
        Occurrences {
            raw: Box::new(IntoIterator::into_iter(&self.set)),
            zone: self.zone,
            bound: self.until.map_or(self.horizon, |until| until.min(self.horizon)),
            ceiling: self.ceiling,
            generated: 0,
            emitted: 0,
            done: false,
        }
    }
}

/// Lazy sequence of raw rule occurrences, in ascending order.
///
/// Terminates after `count` occurrences, after the first candidate past
/// `until` or the horizon, or with [`RecurrenceError::IterationCeiling`]
/// when none of those bounds is reached within the ceiling.
pub struct Occurrences<'s> {
    raw: Box<dyn Iterator<Item = DateTime<Tz>> + 's>,
    zone: Zone<'s>,
    bound: DateTime<Utc>,
    ceiling: u32,
    generated: u32,
    emitted: u32,
    done: bool,
}

impl Occurrences<'_> {
    /// Raw occurrences emitted so far.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Candidates pulled from the rule so far, including ones past the bound.
    pub fn generated(&self) -> u32 {
        self.generated
    }
}

impl Iterator for Occurrences<'_> {
    type Item = Result<DateTime<Utc>, RecurrenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(candidate) = self.raw.next() else {
                self.done = true;
                break;
            };
            self.generated += 1;
            if self.generated > self.ceiling {
                self.done = true;
                return Some(Err(RecurrenceError::IterationCeiling(self.ceiling)));
            }

            let wall = candidate.naive_utc();
            let start = self.zone.to_utc(wall);
            if start <= self.bound {
                self.emitted += 1;
                return Some(Ok(start));
            }
            // Offsets stay within a day, so once the wall clock is a full day
            // past the bound nothing later can map back inside it.
            if wall
                .checked_sub_signed(Duration::days(1))
                .map_or(true, |w| w.and_utc() > self.bound)
            {
                self.done = true;
            }
        }
        None
    }
}

/// A later anchor with the same phase as `anchor`, chosen so that no
/// occurrence at or after `instant` is lost.
///
/// Only fixed-length periods are moved, and only for rules without `COUNT`:
/// with a count, every earlier occurrence still uses part of it. Monthly and
/// yearly rules keep their anchor since the days `rrule` infers from it would
/// shift.
pub fn fast_forward(rule: &RecurrenceRule, anchor: NaiveDateTime, instant: DateTime<Utc>) -> NaiveDateTime {
    if rule.count.is_some() {
        return anchor;
    }
    let unit_seconds: i64 = match rule.frequency {
        Frequency::Secondly => 1,
        Frequency::Minutely => 60,
        Frequency::Hourly => 3_600,
        Frequency::Daily => 86_400,
        Frequency::Weekly => 604_800,
        Frequency::Monthly | Frequency::Yearly => return anchor,
    };
    // One day of slack for the zone offset, plus one whole period for
    // weekly selectors that fall before the anchor's weekday.
    let Some(target) = instant.naive_utc().checked_sub_signed(Duration::days(1)) else {
        return anchor;
    };
    let Some(period) = unit_seconds.checked_mul(i64::from(rule.interval)) else {
        return anchor;
    };
    let periods = (target - anchor).num_seconds() / period - 1;
    if periods <= 0 {
        return anchor;
    }

    periods
        .checked_mul(period)
        .and_then(Duration::try_seconds)
        .and_then(|offset| anchor.checked_add_signed(offset))
        .unwrap_or(anchor)
}

/// Expand `rule` from `anchor` and return the occurrence starts that fall at
/// or before `window.end`, minus those whose UTC calendar date is listed in
/// `exclusions`.
///
/// `COUNT` limits raw occurrences: excluded dates still use up the count.
///
/// # Errors
/// Returns [`RecurrenceError::InvalidRule`] if the rule cannot be built, or
/// [`RecurrenceError::IterationCeiling`] if it does not terminate within
/// `ceiling` raw occurrences.
pub fn expand(
    rule: &RecurrenceRule,
    anchor: NaiveDateTime,
    zone: Zone<'_>,
    window: &QueryWindow,
    exclusions: &BTreeSet<NaiveDate>,
    ceiling: u32,
) -> Result<Vec<DateTime<Utc>>, RecurrenceError> {
    let schedule = Schedule::new(rule, anchor, zone, window.end())?.with_ceiling(ceiling);
    let mut starts = Vec::new();
    for occurrence in schedule.occurrences() {
        let start = occurrence?;
        if !is_excluded(start, exclusions) {
            starts.push(start);
        }
    }
    Ok(starts)
}

/// Exclusion dates carry only a date, so they match on the occurrence's UTC
/// calendar date rather than the exact instant.
pub fn is_excluded(start: DateTime<Utc>, exclusions: &BTreeSet<NaiveDate>) -> bool {
    exclusions.contains(&start.date_naive())
}
