//! Typed interpretation of DATE, DATE-TIME and DURATION property values.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use super::lexer::ContentLine;
use crate::timezone::TimeBasis;

/// A wall-clock time together with how it maps to an absolute instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WallTime {
    pub wall: NaiveDateTime,
    pub basis: TimeBasis,
    /// The value was a bare `DATE` (all-day).
    pub date_only: bool,
}

/// Parse every comma-separated value of a DATE / DATE-TIME property.
///
/// Values that cannot be parsed are dropped.
pub(crate) fn date_values(line: &ContentLine) -> Vec<WallTime> {
    let tzid = line.param("TZID");
    let date_typed = line
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"));

    line.value
        .split(',')
        .filter_map(|raw| parse_date_time(raw, tzid, date_typed))
        .collect()
}

/// Parse the first value of a DATE / DATE-TIME property.
pub(crate) fn date_value(line: &ContentLine) -> Option<WallTime> {
    date_values(line).into_iter().next()
}

/// Parse `YYYYMMDD`, `YYYYMMDDTHHMMSS` or `YYYYMMDDTHHMMSSZ`.
pub(crate) fn parse_date_time(raw: &str, tzid: Option<&str>, date_typed: bool) -> Option<WallTime> {
    let raw = raw.trim();

    if date_typed || (raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit())) {
        let date = NaiveDate::parse_from_str(raw.get(..8)?, "%Y%m%d").ok()?;
        return Some(WallTime {
            wall: date.and_time(NaiveTime::MIN),
            basis: TimeBasis::Floating,
            date_only: true,
        });
    }

    if let Some(utc) = raw.strip_suffix(['Z', 'z']) {
        let wall = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
        return Some(WallTime {
            wall,
            basis: TimeBasis::Utc,
            date_only: false,
        });
    }

    let wall = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S").ok()?;
    let basis = match tzid {
        Some(id) if !id.is_empty() => TimeBasis::Zoned(id.to_string()),
        _ => TimeBasis::Floating,
    };
    Some(WallTime {
        wall,
        basis,
        date_only: false,
    })
}

/// Parse an RFC 5545 duration such as `PT1H30M`, `P1D`, `-PT15M` or `P2W`.
pub(crate) fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (negative, rest) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    let rest = rest.strip_prefix(['P', 'p'])?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    let mut saw_component = false;

    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            'T' => in_time = true,
            d if d.is_ascii_digit() => number.push(d),
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n)?,
                    ('D', false) => Duration::try_days(n)?,
                    ('H', true) => Duration::try_hours(n)?,
                    ('M', true) => Duration::try_minutes(n)?,
                    ('S', true) => Duration::try_seconds(n)?,
                    _ => return None,
                };
                total = total.checked_add(&part)?;
                saw_component = true;
            }
        }
    }

    if !number.is_empty() || !saw_component {
        return None;
    }
    Some(if negative { -total } else { total })
}
