//! Timezone definitions embedded in a feed.
//!
//! Only what the feed itself carries (VTIMEZONE components) is used to map
//! wall-clock times to UTC; there is no timezone database lookup. A TZID that
//! the feed never defines falls back to the feed default (`X-WR-TIMEZONE`,
//! when embedded) and finally to UTC.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use tracing::debug;

use crate::ical::lexer::Component;
use crate::ical::value::{date_value, date_values};
use crate::rule::WeekdaySelector;

/// How a wall-clock value relates to UTC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TimeBasis {
    /// The value carried a `Z` suffix.
    #[default]
    Utc,
    /// The value carried a `TZID` parameter.
    Zoned(String),
    /// Neither; interpreted in the feed's default zone.
    Floating,
}

/// Offset east of UTC, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UtcOffset(i32);

impl UtcOffset {
    pub fn from_seconds(seconds: i32) -> Self {
        Self(seconds)
    }

    pub fn seconds(self) -> i32 {
        self.0
    }

    /// Parse `+HHMM`, `-HHMM` or `+HHMMSS`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (sign, digits) = match raw.as_bytes().first()? {
            b'+' => (1, &raw[1..]),
            b'-' => (-1, &raw[1..]),
            _ => return None,
        };
        if !(digits.len() == 4 || digits.len() == 6) || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let hours: i32 = digits[0..2].parse().ok()?;
        let minutes: i32 = digits[2..4].parse().ok()?;
        let seconds: i32 = digits.get(4..6).map_or(Some(0), |s| s.parse().ok())?;
        Some(Self(sign * (hours * 3600 + minutes * 60 + seconds)))
    }

    fn as_duration(self) -> Duration {
        Duration::seconds(i64::from(self.0))
    }
}

/// A yearly transition such as "second Sunday of March".
#[derive(Debug, Clone, PartialEq, Eq)]
struct TransitionRule {
    month: u32,
    ordinal: i8,
    weekday: Weekday,
    until: Option<NaiveDateTime>,
}

impl TransitionRule {
    /// Understands the `FREQ=YEARLY;BYMONTH=..;BYDAY=..` shape used by
    /// VTIMEZONE observances, including the older `BYDAY=SU;BYMONTHDAY=8,..,14`.
    fn parse(text: &str) -> Option<Self> {
        let mut freq = None;
        let mut month = None;
        let mut selector = None;
        let mut first_month_day: Option<i8> = None;
        let mut until = None;

        for part in text.trim().trim_start_matches("RRULE:").split(';') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => freq = Some(value.trim().to_ascii_uppercase()),
                "BYMONTH" => month = value.split(',').next()?.trim().parse().ok(),
                "BYDAY" => selector = value.split(',').next()?.parse::<WeekdaySelector>().ok(),
                "BYMONTHDAY" => {
                    first_month_day = value.split(',').filter_map(|d| d.trim().parse().ok()).min();
                }
                "UNTIL" => {
                    until = crate::ical::value::parse_date_time(value, None, false).map(|u| u.wall);
                }
                _ => {}
            }
        }

        if freq.as_deref() != Some("YEARLY") {
            return None;
        }
        let selector = selector?;
        let ordinal = match (selector.ordinal, first_month_day) {
            (Some(n), _) => n,
            (None, Some(day)) if day > 0 => (day - 1) / 7 + 1,
            _ => return None,
        };

        Some(Self {
            month: month?,
            ordinal,
            weekday: selector.weekday,
            until,
        })
    }

    fn onset_in(&self, year: i32, at: NaiveDateTime) -> Option<NaiveDateTime> {
        let first = NaiveDate::from_ymd_opt(year, self.month, 1)?;
        let last = last_day_of_month(year, self.month)?;
        let date = nth_weekday(first, last, self.weekday, self.ordinal)?;
        Some(date.and_time(at.time()))
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year.checked_add(1)?, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// The `ordinal`-th `weekday` between `first` and `last` inclusive; negative
/// ordinals count back from `last`.
fn nth_weekday(first: NaiveDate, last: NaiveDate, weekday: Weekday, ordinal: i8) -> Option<NaiveDate> {
    let target = weekday.num_days_from_monday();
    let weeks = 7 * (u64::from(ordinal.unsigned_abs()).checked_sub(1)?);
    if ordinal > 0 {
        let offset = (target + 7 - first.weekday().num_days_from_monday()) % 7;
        let date = first.checked_add_days(Days::new(u64::from(offset) + weeks))?;
        (date <= last).then_some(date)
    } else {
        let offset = (last.weekday().num_days_from_monday() + 7 - target) % 7;
        let date = last.checked_sub_days(Days::new(u64::from(offset) + weeks))?;
        (date >= first).then_some(date)
    }
}

/// A STANDARD or DAYLIGHT sub-component.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Observance {
    start: NaiveDateTime,
    offset_from: UtcOffset,
    offset_to: UtcOffset,
    rule: Option<TransitionRule>,
    rdates: Vec<NaiveDateTime>,
}

impl Observance {
    fn from_component(component: &Component) -> Option<Self> {
        let start = date_value(component.property("DTSTART")?)?.wall;
        let offset_to = UtcOffset::parse(&component.property("TZOFFSETTO")?.value)?;
        let offset_from = component
            .property("TZOFFSETFROM")
            .and_then(|p| UtcOffset::parse(&p.value))
            .unwrap_or(offset_to);
        let rule = component
            .property("RRULE")
            .and_then(|p| TransitionRule::parse(&p.value));
        let rdates = component
            .properties("RDATE")
            .flat_map(date_values)
            .map(|w| w.wall)
            .collect();

        Some(Self {
            start,
            offset_from,
            offset_to,
            rule,
            rdates,
        })
    }

    /// Most recent onset of this observance at or before `local`.
    fn latest_onset(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        if local < self.start {
            return None;
        }

        let mut best = self.start;
        for rdate in &self.rdates {
            if *rdate <= local && *rdate > best {
                best = *rdate;
            }
        }

        if let Some(rule) = &self.rule {
            let last_year = rule
                .until
                .map_or(local.year(), |until| until.year().min(local.year()));
            for year in [last_year - 1, last_year] {
                let Some(onset) = rule.onset_in(year, self.start) else {
                    continue;
                };
                let within_until = rule.until.map_or(true, |until| onset <= until);
                if onset >= self.start && onset <= local && within_until && onset > best {
                    best = onset;
                }
            }
        }

        Some(best)
    }
}

/// A VTIMEZONE definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VTimezone {
    tzid: String,
    observances: Vec<Observance>,
}

impl VTimezone {
    pub(crate) fn from_component(component: &Component) -> Option<Self> {
        let tzid = component.property("TZID")?.value.trim().to_string();
        let observances: Vec<Observance> = component
            .children
            .iter()
            .filter(|c| c.name == "STANDARD" || c.name == "DAYLIGHT")
            .filter_map(Observance::from_component)
            .collect();

        if tzid.is_empty() || observances.is_empty() {
            return None;
        }
        Some(Self { tzid, observances })
    }

    /// A zone with a single fixed offset.
    pub fn fixed(tzid: impl Into<String>, offset: UtcOffset) -> Self {
        Self {
            tzid: tzid.into(),
            observances: vec![Observance {
                start: NaiveDateTime::MIN,
                offset_from: offset,
                offset_to: offset,
                rule: None,
                rdates: Vec::new(),
            }],
        }
    }

    pub fn tzid(&self) -> &str {
        &self.tzid
    }

    /// Offset in effect at the given local wall-clock time.
    ///
    /// Before the first observance, that observance's `TZOFFSETFROM` applies.
    /// Wall times skipped by a forward jump (e.g. 02:30 on a spring-forward
    /// night) keep the offset from before the jump, as RFC 5545 §3.3.5 asks.
    pub fn offset_at(&self, local: NaiveDateTime) -> UtcOffset {
        let latest = self
            .observances
            .iter()
            .filter_map(|obs| obs.latest_onset(local).map(|onset| (onset, obs)))
            .max_by_key(|(onset, _)| *onset);

        match latest {
            Some((onset, obs)) => {
                let jump = i64::from(obs.offset_to.seconds() - obs.offset_from.seconds());
                let in_gap = jump > 0
                    && onset
                        .checked_add_signed(Duration::seconds(jump))
                        .is_some_and(|gap_end| local < gap_end);
                if in_gap {
                    obs.offset_from
                } else {
                    obs.offset_to
                }
            }
            None => self
                .observances
                .iter()
                .min_by_key(|obs| obs.start)
                .map(|obs| obs.offset_from)
                .unwrap_or_default(),
        }
    }

    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        (local - self.offset_at(local).as_duration()).and_utc()
    }
}

/// How wall-clock values are mapped to UTC for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone<'a> {
    Utc,
    Embedded(&'a VTimezone),
}

impl Zone<'_> {
    pub fn to_utc(self, wall: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Self::Utc => wall.and_utc(),
            Self::Embedded(tz) => tz.to_utc(wall),
        }
    }
}

/// Timezones defined by one parsed feed.
///
/// Built fresh for every parse and passed explicitly to expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimezoneTable {
    zones: HashMap<String, VTimezone>,
    default_tzid: Option<String>,
}

impl TimezoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tz: VTimezone) {
        self.zones.insert(tz.tzid.clone(), tz);
    }

    /// Use `tzid` for floating times and unknown TZIDs. Has no effect unless
    /// the zone is (or later becomes) defined in this table.
    pub fn set_default(&mut self, tzid: impl Into<String>) {
        self.default_tzid = Some(tzid.into());
    }

    pub fn get(&self, tzid: &str) -> Option<&VTimezone> {
        self.zones.get(tzid)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn default_zone(&self) -> Zone<'_> {
        self.default_tzid
            .as_deref()
            .and_then(|id| self.get(id))
            .map_or(Zone::Utc, Zone::Embedded)
    }

    pub fn resolve(&self, basis: &TimeBasis) -> Zone<'_> {
        match basis {
            TimeBasis::Utc => Zone::Utc,
            TimeBasis::Floating => self.default_zone(),
            TimeBasis::Zoned(tzid) => match self.get(tzid) {
                Some(tz) => Zone::Embedded(tz),
                None => {
                    debug!(tzid = %tzid, "TZID not defined in feed; using default zone");
                    self.default_zone()
                }
            },
        }
    }
}
