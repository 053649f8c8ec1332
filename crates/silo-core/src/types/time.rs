//! Time ranges over event timestamps

use serde::{Deserialize, Serialize};

/// A half-open range `[start, end)` over epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// A range is valid when it covers at least one instant
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Start inclusive, end exclusive
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts < self.end
    }
}
