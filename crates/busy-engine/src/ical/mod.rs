//! Feed parser -- raw iCalendar text into [`EventDefinition`]s and the
//! feed's [`TimezoneTable`].
//!
//! Parsing is strict about structure (content-line syntax, balanced
//! `BEGIN`/`END`) and lenient about individual events: a `VEVENT` without a
//! usable start or end is skipped, never fatal.

pub(crate) mod lexer;
pub(crate) mod value;

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::error::ParseError;
use crate::event::EventDefinition;
use crate::rule::RuleSource;
use crate::timezone::{TimezoneTable, VTimezone};
use lexer::Component;
use value::{date_value, date_values, parse_duration, WallTime};

/// Result of parsing one feed payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub events: Vec<EventDefinition>,
    pub timezones: TimezoneTable,
}

/// Parse raw iCalendar text.
///
/// # Errors
/// Returns [`ParseError`] when the payload is empty, has no `VCALENDAR`, or
/// is not syntactically valid.
pub fn parse_feed(text: &str) -> Result<ParsedFeed, ParseError> {
    let roots = lexer::parse_components(text)?;
    let calendars: Vec<&Component> = roots.iter().filter(|c| c.name == "VCALENDAR").collect();
    if calendars.is_empty() {
        return Err(ParseError::MissingCalendar);
    }

    let mut timezones = TimezoneTable::new();
    for calendar in &calendars {
        for vtimezone in calendar.children("VTIMEZONE") {
            match VTimezone::from_component(vtimezone) {
                Some(tz) => timezones.insert(tz),
                None => debug!("ignoring VTIMEZONE without TZID or observances"),
            }
        }
        if let Some(default) = calendar.property("X-WR-TIMEZONE") {
            timezones.set_default(default.value.trim());
        }
    }

    let mut events = Vec::new();
    let mut masters: HashMap<String, usize> = HashMap::new();
    let mut overridden: Vec<(String, NaiveDate)> = Vec::new();

    for vevent in calendars.iter().flat_map(|c| c.children("VEVENT")) {
        let Some(event) = build_event(vevent, &timezones) else {
            continue;
        };
        let uid = vevent.property("UID").map(|p| p.value.trim().to_string());

        match (uid, vevent.property("RECURRENCE-ID").and_then(date_value)) {
            (Some(uid), Some(recurrence_id)) => {
                overridden.push((uid, utc_date(&recurrence_id, &timezones)));
            }
            (Some(uid), None) if event.is_recurring() => {
                masters.insert(uid, events.len());
            }
            _ => {}
        }
        events.push(event);
    }

    // An overridden instance replaces the master's occurrence on that date.
    for (uid, date) in overridden {
        if let Some(&idx) = masters.get(&uid) {
            events[idx].exclusion_dates.insert(date);
        }
    }

    debug!(
        events = events.len(),
        timezones = timezones.len(),
        "parsed calendar feed"
    );

    Ok(ParsedFeed { events, timezones })
}

fn build_event(vevent: &Component, timezones: &TimezoneTable) -> Option<EventDefinition> {
    let Some(start) = vevent.property("DTSTART").and_then(date_value) else {
        debug!("skipping VEVENT without a usable DTSTART");
        return None;
    };
    let start_instant = to_utc(&start, timezones);

    let end_instant = if let Some(end) = vevent.property("DTEND").and_then(date_value) {
        to_utc(&end, timezones)
    } else if let Some(duration) = vevent
        .property("DURATION")
        .and_then(|p| parse_duration(&p.value))
    {
        start_instant.checked_add_signed(duration)?
    } else {
        debug!("skipping VEVENT without DTEND or DURATION");
        return None;
    };

    if end_instant <= start_instant {
        debug!("skipping VEVENT that does not end after it starts");
        return None;
    }

    let recurrence = vevent
        .property("RRULE")
        .map(|p| RuleSource::Textual(p.value.trim().to_string()));

    let exclusion_dates: BTreeSet<NaiveDate> = vevent
        .properties("EXDATE")
        .flat_map(date_values)
        .map(|exdate| utc_date(&exdate, timezones))
        .collect();

    Some(EventDefinition {
        start: start_instant,
        end: end_instant,
        wall_start: start.wall,
        basis: start.basis,
        recurrence,
        exclusion_dates,
    })
}

fn to_utc(value: &WallTime, timezones: &TimezoneTable) -> DateTime<Utc> {
    timezones.resolve(&value.basis).to_utc(value.wall)
}

/// The UTC calendar date of an exclusion value. `DATE` values are taken
/// as-is.
fn utc_date(value: &WallTime, timezones: &TimezoneTable) -> NaiveDate {
    if value.date_only {
        value.wall.date()
    } else {
        to_utc(value, timezones).date_naive()
    }
}
