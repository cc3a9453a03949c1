//! # busy-engine
//!
//! Privacy-preserving free/busy intervals from iCalendar feeds.
//!
//! Given a feed's raw text and a query window, the engine expands recurring
//! events (with exclusions and overridden instances), keeps only start/end
//! information, and returns a sorted, non-overlapping list of busy
//! intervals. Titles, descriptions and attendees never leave the parser.
//!
//! ## Modules
//!
//! - [`ical`]: raw feed text → event definitions + embedded timezones
//! - [`rule`]: textual or structured recurrence rules → [`RecurrenceRule`]
//! - [`expander`]: recurrence rule → concrete occurrence instants
//! - [`interval`]: occurrences → busy intervals overlapping a window
//! - [`normalize`]: sort and merge busy intervals
//! - [`pipeline`]: the whole chain, feed text in, busy intervals out
//! - [`validate`]: fetch-and-check entry point for feed URLs
//! - [`timezone`]: VTIMEZONE offsets and the per-feed timezone table
//! - [`budget`]: request-level work limits
//! - [`error`]: error types

pub mod budget;
pub mod error;
pub mod event;
pub mod expander;
pub mod ical;
pub mod interval;
pub mod normalize;
pub mod pipeline;
pub mod rule;
pub mod timezone;
pub mod validate;

pub use budget::{Budget, ExpandOptions};
pub use error::{CalendarError, FetchError, ParseError, RecurrenceError};
pub use event::EventDefinition;
pub use expander::{expand, fast_forward, Occurrences, Schedule};
pub use ical::{parse_feed, ParsedFeed};
pub use interval::{BusyInterval, QueryWindow};
pub use normalize::normalize;
pub use pipeline::{collect_busy_intervals, expand_busy_intervals, expand_busy_intervals_with};
pub use rule::{Frequency, RecurrenceRule, RuleFields, RuleSource, WeekdaySelector};
pub use timezone::{TimeBasis, TimezoneTable, UtcOffset, VTimezone, Zone};
pub use validate::{validate_feed, validate_text, FeedSource, ValidationReport};
