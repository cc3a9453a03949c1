//! Feed text in, busy intervals out.
//!
//! Parsing, expansion, interval building and normalization chained into the
//! single operation callers use. Per-event recurrence problems degrade to a
//! single occurrence; only unparseable feeds, bad windows and budget
//! exhaustion fail the whole request.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::budget::{BudgetMeter, ExpandOptions};
use crate::error::{RecurrenceError, Result};
use crate::event::EventDefinition;
use crate::expander::{fast_forward, is_excluded, Schedule};
use crate::ical::parse_feed;
use crate::interval::{build_intervals, occurrence_interval, BusyInterval, QueryWindow};
use crate::normalize::{normalize, sort_intervals};
use crate::rule::RuleSource;
use crate::timezone::{TimezoneTable, Zone};

/// Expand a feed into the normalized busy intervals overlapping `window`,
/// using [`ExpandOptions::default`].
///
/// # Errors
/// [`crate::CalendarError::Parse`] when the feed cannot be parsed, or
/// [`crate::CalendarError::BudgetExceeded`] when expansion runs away.
pub fn expand_busy_intervals(feed_text: &str, window: &QueryWindow) -> Result<Vec<BusyInterval>> {
    expand_busy_intervals_with(feed_text, window, &ExpandOptions::default())
}

/// Like [`expand_busy_intervals`] with explicit limits.
pub fn expand_busy_intervals_with(
    feed_text: &str,
    window: &QueryWindow,
    options: &ExpandOptions,
) -> Result<Vec<BusyInterval>> {
    Ok(normalize(collect_busy_intervals(feed_text, window, options)?))
}

/// Every occurrence interval overlapping `window`, sorted but not merged.
///
/// One entry per occurrence, so the length counts the feed's busy
/// occurrences in the window.
pub fn collect_busy_intervals(
    feed_text: &str,
    window: &QueryWindow,
    options: &ExpandOptions,
) -> Result<Vec<BusyInterval>> {
    let feed = parse_feed(feed_text)?;
    let intervals = busy_intervals_for(&feed.events, &feed.timezones, window, options)?;
    Ok(sort_intervals(intervals))
}

/// Build raw (unsorted, unmerged) intervals for already-parsed definitions.
///
/// # Errors
/// [`crate::CalendarError::BudgetExceeded`] when the summed occurrence count
/// or the time limit of `options.budget` is exceeded.
pub fn busy_intervals_for(
    events: &[EventDefinition],
    timezones: &TimezoneTable,
    window: &QueryWindow,
    options: &ExpandOptions,
) -> Result<Vec<BusyInterval>> {
    let mut meter = BudgetMeter::start(&options.budget);
    let mut intervals = Vec::new();

    for event in events {
        let zone = timezones.resolve(&event.basis);
        match &event.recurrence {
            None => intervals.extend(occurrence_interval(event.start, event.duration(), window)),
            Some(source) => {
                intervals.extend(recurring_intervals(event, source, zone, window, options, &mut meter)?);
            }
        }
    }

    debug!(
        events = events.len(),
        intervals = intervals.len(),
        "built busy intervals"
    );
    Ok(intervals)
}

fn recurring_intervals(
    event: &EventDefinition,
    source: &RuleSource,
    zone: Zone<'_>,
    window: &QueryWindow,
    options: &ExpandOptions,
    meter: &mut BudgetMeter,
) -> Result<Vec<BusyInterval>> {
    let duration = event.duration();
    match occurrence_starts(event, source, zone, window, duration, options, meter)? {
        Ok(starts) => Ok(build_intervals(starts, duration, window).collect()),
        Err(err) => {
            warn!(error = %err, "recurrence expansion failed; treating event as a single occurrence");
            Ok(occurrence_interval(event.start, duration, window)
                .into_iter()
                .collect())
        }
    }
}

/// Outer `Result` is request-fatal (budget), inner is a per-event
/// recurrence failure.
fn occurrence_starts(
    event: &EventDefinition,
    source: &RuleSource,
    zone: Zone<'_>,
    window: &QueryWindow,
    duration: Duration,
    options: &ExpandOptions,
    meter: &mut BudgetMeter,
) -> Result<std::result::Result<Vec<DateTime<Utc>>, RecurrenceError>> {
    let rule = match source.resolve(zone) {
        Ok(rule) => rule,
        Err(err) => return Ok(Err(err)),
    };

    let earliest = window
        .start()
        .checked_sub_signed(duration)
        .unwrap_or(window.start());
    let anchor = fast_forward(&rule, event.wall_start, earliest);
    let schedule = match Schedule::new(&rule, anchor, zone, window.end()) {
        Ok(schedule) => schedule.with_ceiling(options.iteration_ceiling),
        Err(err) => return Ok(Err(err)),
    };

    let mut starts = Vec::new();
    for occurrence in schedule.occurrences() {
        let start = match occurrence {
            Ok(start) => start,
            Err(err) => return Ok(Err(err)),
        };
        meter.charge()?;
        if start < earliest || is_excluded(start, &event.exclusion_dates) {
            continue;
        }
        starts.push(start);
    }
    Ok(Ok(starts))
}
