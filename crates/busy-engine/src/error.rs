//! Error types for busy-engine operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The feed is not syntactically valid iCalendar data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("feed is empty")]
    Empty,

    #[error("no VCALENDAR component found")]
    MissingCalendar,

    #[error("line {line}: malformed content line: {content}")]
    MalformedLine { line: usize, content: String },

    #[error("line {line}: END:{found} does not close BEGIN:{expected}")]
    MismatchedEnd {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("line {line}: END:{found} without a matching BEGIN")]
    UnexpectedEnd { line: usize, found: String },

    #[error("component {0} is never closed")]
    Unterminated(String),
}

/// A single event's recurrence rule could not be expanded.
///
/// Never fatal for a feed: the pipeline recovers by treating the event as a
/// single occurrence at its own start/end.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceError {
    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Unrecognized frequency: {0}")]
    UnknownFrequency(String),

    #[error("Invalid {part} selector: {value}")]
    InvalidSelector { part: &'static str, value: String },

    #[error("Rule did not terminate within {0} periods")]
    IterationCeiling(u32),
}

/// Request-level failure of the busy-interval pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("could not load calendar: {0}")]
    Parse(#[from] ParseError),

    #[error("expansion budget exceeded after {occurrences} occurrences")]
    BudgetExceeded { occurrences: u64 },

    #[error("invalid query window: {start} is not before {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Failure reported by a [`crate::validate::FeedSource`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("server responded with HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, CalendarError>;
