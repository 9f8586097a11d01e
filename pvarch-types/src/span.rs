use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ArchiverError;

/// Half-open time interval `[start, end)`.
///
/// Construction enforces `start < end`; a span is never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSpan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeSpan {
    /// Build a span, rejecting `start >= end`.
    ///
    /// # Errors
    /// Returns `ArchiverError::InvalidArg` when the interval is empty or inverted.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ArchiverError> {
        if start >= end {
            return Err(ArchiverError::invalid_arg(format!(
                "time span start {} must be before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Inclusive start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// True when `ts` falls inside `[start, end)`.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// True when `other` lies entirely within this span.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Clip the span so it ends no later than `bound`.
    ///
    /// Returns `None` when nothing of the span lies before `bound`.
    #[must_use]
    pub fn clip_end(&self, bound: DateTime<Utc>) -> Option<Self> {
        let end = self.end.min(bound);
        (self.start < end).then_some(Self {
            start: self.start,
            end,
        })
    }
}
