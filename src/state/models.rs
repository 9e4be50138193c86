//! Engine state model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Debounced or raw status of a probed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Down => "down",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one probe of one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub target_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: Status,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn up(target_name: &str, timestamp: DateTime<Utc>, response_time_ms: u64) -> Self {
        Self {
            target_name: target_name.to_string(),
            timestamp,
            status: Status::Up,
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn down(target_name: &str, timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            target_name: target_name.to_string(),
            timestamp,
            status: Status::Down,
            response_time_ms: None,
            error: Some(error.into()),
        }
    }

    #[cfg(test)]
    pub fn is_up(&self) -> bool {
        self.status == Status::Up
    }
}

/// Debounced state of a single target.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceState {
    pub target_name: String,
    pub current_status: Status,
    pub status_since: DateTime<Utc>,
    pub consecutive_success: u32,
    pub consecutive_failure: u32,
}

impl ServiceState {
    /// Fresh state: down, zero counters.
    pub fn new(target_name: &str, since: DateTime<Utc>) -> Self {
        Self {
            target_name: target_name.to_string(),
            current_status: Status::Down,
            status_since: since,
            consecutive_success: 0,
            consecutive_failure: 0,
        }
    }
}

/// A confirmed status flip emitted by the status tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub target_name: String,
    pub to: Status,
    pub at: DateTime<Utc>,
}

/// An interval during which a target's debounced status was down.
#[derive(Debug, Clone, PartialEq)]
pub struct DowntimeEvent {
    pub target_name: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub resolved: bool,
}

impl DowntimeEvent {
    pub fn open(target_name: &str, start_ts: DateTime<Utc>) -> Self {
        Self {
            target_name: target_name.to_string(),
            start_ts,
            end_ts: None,
            duration_minutes: None,
            resolved: false,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.resolved
    }

    /// Wire form: `[name, start_ts, end_ts|null, duration_minutes|null, resolved]`.
    pub fn to_row(&self) -> DowntimeRow {
        (
            self.target_name.clone(),
            self.start_ts,
            self.end_ts,
            self.duration_minutes,
            self.resolved,
        )
    }
}

/// Tuple form of a downtime event; serializes as a JSON array.
pub type DowntimeRow = (String, DateTime<Utc>, Option<DateTime<Utc>>, Option<i64>, bool);
