//! Time windows for delta queries
//!
//! Feeds like NVD reject `lastModified` ranges wider than a fixed span, so a
//! requested range is cut into contiguous sub-windows before it is queried.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open `[start, end)` time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// True when the window covers no time at all (`start >= end`)
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Length of the window (zero for empty or inverted windows)
    pub fn span(&self) -> Duration {
        if self.is_empty() {
            Duration::zero()
        } else {
            self.end - self.start
        }
    }

    /// Split into ordered sub-windows no longer than `max_span`
    pub fn split(&self, max_span: Duration) -> Vec<TimeWindow> {
        split(*self, max_span)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Split `window` into contiguous sub-windows of at most `max_span` each.
///
/// Each sub-window's end is the next one's start and the last end is clamped
/// to `window.end`, so the pieces cover the input exactly once. An empty or
/// inverted window yields no pieces. A non-positive span yields the whole
/// window as a single piece.
pub fn split(window: TimeWindow, max_span: Duration) -> Vec<TimeWindow> {
    if window.is_empty() {
        return Vec::new();
    }
    if max_span <= Duration::zero() {
        return vec![window];
    }

    let mut windows = Vec::new();
    let mut cursor = window.start;
    while cursor < window.end {
        let next_end = match cursor.checked_add_signed(max_span) {
            Some(t) if t < window.end => t,
            _ => window.end,
        };
        windows.push(TimeWindow::new(cursor, next_end));
        cursor = next_end;
    }
    windows
}
