//! Feed validation: fetch a feed and report whether it yields busy data.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::budget::ExpandOptions;
use crate::error::FetchError;
use crate::interval::QueryWindow;
use crate::pipeline::collect_busy_intervals;

/// Days ahead of "now" that validation looks for events.
pub const VALIDATION_WINDOW_DAYS: i64 = 60;

/// Something that can retrieve feed text for a URL.
pub trait FeedSource {
    /// # Errors
    /// Returns [`FetchError`] on timeout, non-success status or transport
    /// failure.
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

impl<F> FeedSource for F
where
    F: Fn(&str) -> Result<String, FetchError>,
{
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self(url)
    }
}

/// Outcome of validating one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Occurrences (not merged intervals) found in the validation window.
    pub event_count: usize,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationReport {
    fn valid(event_count: usize) -> Self {
        Self {
            event_count,
            is_valid: true,
            error: None,
        }
    }

    fn invalid(error: impl ToString) -> Self {
        Self {
            event_count: 0,
            is_valid: false,
            error: Some(error.to_string()),
        }
    }
}

/// Fetch `url` through `source` and validate the payload.
///
/// Never fails: fetch and parse problems are reported in the returned
/// [`ValidationReport`].
pub fn validate_feed<S>(source: &S, url: &str, now: DateTime<Utc>) -> ValidationReport
where
    S: FeedSource + ?Sized,
{
    debug!(url, "fetching feed for validation");
    match source.fetch(url) {
        Ok(text) => validate_text(&text, now),
        Err(err) => {
            info!(url, error = %err, "feed fetch failed");
            ValidationReport::invalid(err)
        }
    }
}

/// Validate feed text already in hand, counting occurrences in the
/// [`VALIDATION_WINDOW_DAYS`] after `now`.
///
/// A feed with zero events in the window is still valid.
pub fn validate_text(text: &str, now: DateTime<Utc>) -> ValidationReport {
    let window = match QueryWindow::starting_at(now, Duration::days(VALIDATION_WINDOW_DAYS)) {
        Ok(window) => window,
        Err(err) => return ValidationReport::invalid(err),
    };

    match collect_busy_intervals(text, &window, &ExpandOptions::default()) {
        Ok(intervals) => ValidationReport::valid(intervals.len()),
        Err(err) => ValidationReport::invalid(err),
    }
}
