//! Recurrence rule sources and their canonical, validated form.
//!
//! A feed carries rules as RRULE text; programmatic callers may hand over the
//! individual fields instead. Both are resolved once into a
//! [`RecurrenceRule`] before expansion.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Month, NaiveTime, Utc, Weekday};
use rrule::{NWeekday, RRule, Unvalidated};
use serde::{Deserialize, Serialize};

use crate::error::RecurrenceError;
use crate::ical::value::parse_date_time;
use crate::timezone::{TimeBasis, Zone};

/// Recurrence frequency (RFC 5545 `FREQ`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl FromStr for Frequency {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SECONDLY" => Ok(Self::Secondly),
            "MINUTELY" => Ok(Self::Minutely),
            "HOURLY" => Ok(Self::Hourly),
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(RecurrenceError::UnknownFrequency(other.to_string())),
        }
    }
}

impl From<rrule::Frequency> for Frequency {
    fn from(freq: rrule::Frequency) -> Self {
        match freq {
            rrule::Frequency::Secondly => Self::Secondly,
            rrule::Frequency::Minutely => Self::Minutely,
            rrule::Frequency::Hourly => Self::Hourly,
            rrule::Frequency::Daily => Self::Daily,
            rrule::Frequency::Weekly => Self::Weekly,
            rrule::Frequency::Monthly => Self::Monthly,
            rrule::Frequency::Yearly => Self::Yearly,
        }
    }
}

impl From<Frequency> for rrule::Frequency {
    fn from(freq: Frequency) -> Self {
        match freq {
            Frequency::Secondly => Self::Secondly,
            Frequency::Minutely => Self::Minutely,
            Frequency::Hourly => Self::Hourly,
            Frequency::Daily => Self::Daily,
            Frequency::Weekly => Self::Weekly,
            Frequency::Monthly => Self::Monthly,
            Frequency::Yearly => Self::Yearly,
        }
    }
}

/// A `BYDAY` entry: a weekday, optionally restricted to its nth occurrence
/// within the month (or year). Negative ordinals count from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdaySelector {
    pub ordinal: Option<i8>,
    pub weekday: Weekday,
}

impl WeekdaySelector {
    pub fn every(weekday: Weekday) -> Self {
        Self {
            ordinal: None,
            weekday,
        }
    }

    pub fn nth(ordinal: i8, weekday: Weekday) -> Self {
        Self {
            ordinal: Some(ordinal),
            weekday,
        }
    }
}

impl FromStr for WeekdaySelector {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RecurrenceError::InvalidSelector {
            part: "BYDAY",
            value: s.to_string(),
        };
        let token = s.trim();
        if token.len() < 2 || !token.is_char_boundary(token.len() - 2) {
            return Err(invalid());
        }
        let (ordinal, day) = token.split_at(token.len() - 2);

        let weekday = match day.to_ascii_uppercase().as_str() {
            "MO" => Weekday::Mon,
            "TU" => Weekday::Tue,
            "WE" => Weekday::Wed,
            "TH" => Weekday::Thu,
            "FR" => Weekday::Fri,
            "SA" => Weekday::Sat,
            "SU" => Weekday::Sun,
            _ => return Err(invalid()),
        };

        if ordinal.is_empty() {
            return Ok(Self::every(weekday));
        }
        let n: i8 = ordinal.parse().map_err(|_| invalid())?;
        Ok(Self::nth(n, weekday))
    }
}

impl From<WeekdaySelector> for NWeekday {
    fn from(selector: WeekdaySelector) -> Self {
        match selector.ordinal {
            Some(n) => NWeekday::Nth(i16::from(n), selector.weekday),
            None => NWeekday::Every(selector.weekday),
        }
    }
}

impl fmt::Display for WeekdaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let day = match self.weekday {
            Weekday::Mon => "MO",
            Weekday::Tue => "TU",
            Weekday::Wed => "WE",
            Weekday::Thu => "TH",
            Weekday::Fri => "FR",
            Weekday::Sat => "SA",
            Weekday::Sun => "SU",
        };
        match self.ordinal {
            Some(n) => write!(f, "{n}{day}"),
            None => f.write_str(day),
        }
    }
}

/// The canonical recurrence rule consumed by the expander.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Always at least 1.
    pub interval: u32,
    /// Hard cap on raw occurrences, counted from the anchor.
    pub count: Option<u32>,
    /// Inclusive upper bound on occurrence starts.
    pub until: Option<DateTime<Utc>>,
    pub by_weekday: Vec<WeekdaySelector>,
    /// Days of the month, `1..=31` or `-31..=-1` counting from the end.
    pub by_month_day: Vec<i8>,
    /// Months, `1..=12`.
    pub by_month: Vec<u32>,
    /// Positions within each period's candidate set, `1..=366` or
    /// `-366..=-1`.
    pub by_set_pos: Vec<i32>,
    pub by_year_day: Vec<i16>,
    /// ISO-style week numbers, counted from `week_start`.
    pub by_week_no: Vec<i8>,
    pub by_hour: Vec<u8>,
    pub by_minute: Vec<u8>,
    pub by_second: Vec<u8>,
    /// First day of the week (`WKST`), Monday unless the rule says otherwise.
    pub week_start: Weekday,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            count: None,
            until: None,
            by_weekday: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
            by_set_pos: Vec::new(),
            by_year_day: Vec::new(),
            by_week_no: Vec::new(),
            by_hour: Vec::new(),
            by_minute: Vec::new(),
            by_second: Vec::new(),
            week_start: Weekday::Mon,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    #[must_use]
    pub fn with_by_weekday(mut self, selectors: Vec<WeekdaySelector>) -> Self {
        self.by_weekday = selectors;
        self
    }

    #[must_use]
    pub fn with_by_month_day(mut self, days: Vec<i8>) -> Self {
        self.by_month_day = days;
        self
    }

    #[must_use]
    pub fn with_by_month(mut self, months: Vec<u32>) -> Self {
        self.by_month = months;
        self
    }

    #[must_use]
    pub fn with_by_set_pos(mut self, positions: Vec<i32>) -> Self {
        self.by_set_pos = positions;
        self
    }

    #[must_use]
    pub fn with_by_year_day(mut self, days: Vec<i16>) -> Self {
        self.by_year_day = days;
        self
    }

    #[must_use]
    pub fn with_by_week_no(mut self, weeks: Vec<i8>) -> Self {
        self.by_week_no = weeks;
        self
    }

    #[must_use]
    pub fn with_by_hour(mut self, hours: Vec<u8>) -> Self {
        self.by_hour = hours;
        self
    }

    #[must_use]
    pub fn with_by_minute(mut self, minutes: Vec<u8>) -> Self {
        self.by_minute = minutes;
        self
    }

    #[must_use]
    pub fn with_week_start(mut self, weekday: Weekday) -> Self {
        self.week_start = weekday;
        self
    }

    /// Check the invariants the expander relies on.
    ///
    /// # Errors
    /// Returns [`RecurrenceError`] for a zero interval or count, or any
    /// selector outside its RFC 5545 range.
    pub fn validate(self) -> Result<Self, RecurrenceError> {
        if self.interval == 0 {
            return Err(RecurrenceError::InvalidRule("INTERVAL must be positive".into()));
        }
        if self.count == Some(0) {
            return Err(RecurrenceError::InvalidRule("COUNT must be positive".into()));
        }
        if let Some(day) = self
            .by_month_day
            .iter()
            .find(|d| **d == 0 || !(-31..=31).contains(*d))
        {
            return Err(RecurrenceError::InvalidSelector {
                part: "BYMONTHDAY",
                value: day.to_string(),
            });
        }
        if let Some(month) = self.by_month.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(RecurrenceError::InvalidSelector {
                part: "BYMONTH",
                value: month.to_string(),
            });
        }
        if let Some(pos) = self
            .by_set_pos
            .iter()
            .find(|p| **p == 0 || !(-366..=366).contains(*p))
        {
            return Err(RecurrenceError::InvalidSelector {
                part: "BYSETPOS",
                value: pos.to_string(),
            });
        }
        if let Some(day) = self
            .by_year_day
            .iter()
            .find(|d| **d == 0 || !(-366..=366).contains(*d))
        {
            return Err(RecurrenceError::InvalidSelector {
                part: "BYYEARDAY",
                value: day.to_string(),
            });
        }
        if let Some(week) = self
            .by_week_no
            .iter()
            .find(|w| **w == 0 || !(-53..=53).contains(*w))
        {
            return Err(RecurrenceError::InvalidSelector {
                part: "BYWEEKNO",
                value: week.to_string(),
            });
        }
        for (part, values, max) in [
            ("BYHOUR", &self.by_hour, 23),
            ("BYMINUTE", &self.by_minute, 59),
            ("BYSECOND", &self.by_second, 59),
        ] {
            if let Some(value) = values.iter().find(|v| **v > max) {
                return Err(RecurrenceError::InvalidSelector {
                    part,
                    value: value.to_string(),
                });
            }
        }
        if let Some(sel) = self
            .by_weekday
            .iter()
            .find(|s| s.ordinal.is_some_and(|n| n == 0 || !(-53..=53).contains(&n)))
        {
            return Err(RecurrenceError::InvalidSelector {
                part: "BYDAY",
                value: sel.to_string(),
            });
        }
        Ok(self)
    }

    /// The rule in `rrule`'s builder form, without `UNTIL`.
    ///
    /// `UNTIL` stays out because the set is built on wall-clock time; the
    /// expander applies it to the mapped UTC instants instead.
    pub(crate) fn to_rrule(&self) -> Result<RRule<Unvalidated>, RecurrenceError> {
        let interval = u16::try_from(self.interval)
            .map_err(|_| RecurrenceError::InvalidRule(format!("INTERVAL too large: {}", self.interval)))?;
        let months = self
            .by_month
            .iter()
            .map(|m| {
                u8::try_from(*m)
                    .ok()
                    .and_then(|m| Month::try_from(m).ok())
                    .ok_or_else(|| RecurrenceError::InvalidSelector {
                        part: "BYMONTH",
                        value: m.to_string(),
                    })
            })
            .collect::<Result<Vec<Month>, _>>()?;

        let mut rrule = RRule::new(self.frequency.into())
            .interval(interval)
            .week_start(self.week_start)
            .by_weekday(self.by_weekday.iter().copied().map(NWeekday::from).collect())
            .by_month_day(self.by_month_day.clone())
            .by_month(&months)
            .by_year_day(self.by_year_day.clone())
            .by_week_no(self.by_week_no.clone())
            .by_hour(self.by_hour.clone())
            .by_minute(self.by_minute.clone())
            .by_second(self.by_second.clone())
            .by_set_pos(self.by_set_pos.clone());
        if let Some(count) = self.count {
            rrule = rrule.count(count);
        }
        Ok(rrule)
    }
}

/// Rule fields supplied directly by a caller instead of as RRULE text.
///
/// Values are kept as given; [`RuleSource::resolve`] validates them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleFields {
    /// Frequency token, e.g. `"WEEKLY"`.
    pub frequency: String,
    pub interval: Option<u32>,
    pub count: Option<u32>,
    pub until: Option<DateTime<Utc>>,
    /// `BYDAY` tokens such as `"MO"` or `"-1FR"`.
    pub by_weekday: Vec<String>,
    pub by_month_day: Vec<i8>,
    pub by_month: Vec<u8>,
    pub by_set_pos: Vec<i32>,
    pub by_year_day: Vec<i16>,
    pub by_week_no: Vec<i8>,
    pub by_hour: Vec<u8>,
    pub by_minute: Vec<u8>,
    pub by_second: Vec<u8>,
    /// `WKST` token such as `"SU"`; Monday when absent.
    pub week_start: Option<String>,
}

/// Where a recurring definition's rule came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    Textual(String),
    Structured(RuleFields),
}

impl RuleSource {
    /// Resolve into a validated [`RecurrenceRule`].
    ///
    /// `zone` interprets a floating or zoned `UNTIL` in textual rules.
    ///
    /// # Errors
    /// Returns [`RecurrenceError`] when the rule cannot be understood; the
    /// caller is expected to fall back to a single occurrence.
    pub fn resolve(&self, zone: Zone<'_>) -> Result<RecurrenceRule, RecurrenceError> {
        match self {
            Self::Textual(text) => resolve_textual(text, zone),
            Self::Structured(fields) => resolve_structured(fields),
        }
    }
}

fn resolve_textual(text: &str, zone: Zone<'_>) -> Result<RecurrenceRule, RecurrenceError> {
    let body = text.trim();
    let body = body
        .get(..6)
        .filter(|prefix| prefix.eq_ignore_ascii_case("RRULE:"))
        .map_or(body, |_| &body[6..]);
    if body.is_empty() {
        return Err(RecurrenceError::InvalidRule("empty RRULE string".into()));
    }

    // UNTIL is interpreted here rather than by `rrule`, which would read a
    // floating UNTIL in the host's local zone.
    let mut grammar_parts = Vec::new();
    let mut until = None;
    for part in body.split(';').filter(|p| !p.trim().is_empty()) {
        match part.split_once('=') {
            Some((key, value)) if key.trim().eq_ignore_ascii_case("UNTIL") => {
                until = Some(parse_until(value, zone)?);
            }
            _ => grammar_parts.push(part.trim()),
        }
    }

    let parsed: RRule<Unvalidated> = grammar_parts
        .join(";")
        .parse()
        .map_err(|e| RecurrenceError::InvalidRule(format!("{e}")))?;

    let by_weekday = parsed
        .get_by_weekday()
        .iter()
        .map(|nwd| match *nwd {
            NWeekday::Every(weekday) => Ok(WeekdaySelector::every(weekday)),
            NWeekday::Nth(n, weekday) => i8::try_from(n)
                .map(|n| WeekdaySelector::nth(n, weekday))
                .map_err(|_| RecurrenceError::InvalidSelector {
                    part: "BYDAY",
                    value: n.to_string(),
                }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    RecurrenceRule {
        frequency: parsed.get_freq().into(),
        interval: u32::from(parsed.get_interval()),
        count: parsed.get_count(),
        until,
        by_weekday,
        by_month_day: parsed.get_by_month_day().to_vec(),
        by_month: parsed.get_by_month().iter().map(|m| u32::from(*m)).collect(),
        by_set_pos: parsed.get_by_set_pos().to_vec(),
        by_year_day: parsed.get_by_year_day().to_vec(),
        by_week_no: parsed.get_by_week_no().to_vec(),
        by_hour: parsed.get_by_hour().to_vec(),
        by_minute: parsed.get_by_minute().to_vec(),
        by_second: parsed.get_by_second().to_vec(),
        week_start: parsed.get_week_start(),
    }
    .validate()
}

fn parse_until(value: &str, zone: Zone<'_>) -> Result<DateTime<Utc>, RecurrenceError> {
    let until = parse_date_time(value, None, false)
        .ok_or_else(|| RecurrenceError::InvalidRule(format!("invalid UNTIL: {value}")))?;

    // A date-only UNTIL includes the whole day.
    let wall = if until.date_only {
        until.wall.date().and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
    } else {
        until.wall
    };

    Ok(match until.basis {
        TimeBasis::Utc => wall.and_utc(),
        TimeBasis::Floating | TimeBasis::Zoned(_) => zone.to_utc(wall),
    })
}

fn resolve_structured(fields: &RuleFields) -> Result<RecurrenceRule, RecurrenceError> {
    let frequency: Frequency = fields.frequency.parse()?;
    let by_weekday = fields
        .by_weekday
        .iter()
        .map(|token| token.parse())
        .collect::<Result<Vec<WeekdaySelector>, _>>()?;
    let week_start = match fields.week_start.as_deref() {
        None => Weekday::Mon,
        Some(token) => match token.parse::<WeekdaySelector>() {
            Ok(WeekdaySelector { ordinal: None, weekday }) => weekday,
            _ => {
                return Err(RecurrenceError::InvalidSelector {
                    part: "WKST",
                    value: token.to_string(),
                })
            }
        },
    };

    RecurrenceRule {
        frequency,
        interval: fields.interval.unwrap_or(1),
        count: fields.count,
        until: fields.until,
        by_weekday,
        by_month_day: fields.by_month_day.clone(),
        by_month: fields.by_month.iter().map(|m| u32::from(*m)).collect(),
        by_set_pos: fields.by_set_pos.clone(),
        by_year_day: fields.by_year_day.clone(),
        by_week_no: fields.by_week_no.clone(),
        by_hour: fields.by_hour.clone(),
        by_minute: fields.by_minute.clone(),
        by_second: fields.by_second.clone(),
        week_start,
    }
    .validate()
}
