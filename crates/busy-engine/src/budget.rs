//! Request-level work limits.

use std::time::{Duration, Instant};

use crate::error::{CalendarError, Result};
use crate::expander::DEFAULT_ITERATION_CEILING;

/// Caps the total work one call may do across all events of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Maximum raw occurrences generated, summed over every recurring event.
    pub max_occurrences: Option<u64>,
    /// Wall-clock time allowed for expansion.
    pub time_limit: Option<Duration>,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_occurrences: Some(1_000_000),
            time_limit: None,
        }
    }
}

impl Budget {
    /// No limits at all.
    pub fn unlimited() -> Self {
        Self {
            max_occurrences: None,
            time_limit: None,
        }
    }
}

/// Tunables for one expansion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Per-rule limit on periods stepped through before the rule is treated
    /// as malformed.
    pub iteration_ceiling: u32,
    pub budget: Budget,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            iteration_ceiling: DEFAULT_ITERATION_CEILING,
            budget: Budget::default(),
        }
    }
}

/// Running tally against a [`Budget`].
#[derive(Debug)]
pub(crate) struct BudgetMeter {
    spent: u64,
    limit: Option<u64>,
    deadline: Option<Instant>,
}

impl BudgetMeter {
    pub fn start(budget: &Budget) -> Self {
        Self {
            spent: 0,
            limit: budget.max_occurrences,
            deadline: budget.time_limit.and_then(|d| Instant::now().checked_add(d)),
        }
    }

    /// Account for one generated occurrence.
    pub fn charge(&mut self) -> Result<()> {
        self.spent += 1;
        let over_count = self.limit.is_some_and(|limit| self.spent > limit);
        // Clock reads are batched; the deadline is checked every 256 charges.
        let over_time = self.spent % 256 == 0
            && self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        if over_count || over_time {
            return Err(CalendarError::BudgetExceeded {
                occurrences: self.spent,
            });
        }
        Ok(())
    }
}
