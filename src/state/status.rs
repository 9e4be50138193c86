//! Debounced per-target status state machines.

use super::models::{CheckResult, ServiceState, Status, Transition};

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Consecutive same-direction results required before a status flip.
pub const DEBOUNCE_THRESHOLD: u32 = 3;

/// Owns one state machine per monitorable target.
#[derive(Debug, Default)]
pub struct StatusTracker {
    states: HashMap<String, ServiceState>,
}

impl StatusTracker {
    /// Create a tracker with every target in its initial `down` state.
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>, since: DateTime<Utc>) -> Self {
        let states = names
            .into_iter()
            .map(|name| (name.to_string(), ServiceState::new(name, since)))
            .collect();
        Self { states }
    }

    pub fn get(&self, name: &str) -> Option<&ServiceState> {
        self.states.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Feed one result into its target's state machine.
    ///
    /// Returns the transition when this result completed a debounce. Results
    /// for unknown targets are ignored.
    pub fn apply(&mut self, result: &CheckResult) -> Option<Transition> {
        let state = self.states.get_mut(&result.target_name)?;

        let reached = match result.status {
            Status::Up => {
                state.consecutive_success += 1;
                state.consecutive_failure = 0;
                state.consecutive_success
            }
            Status::Down => {
                state.consecutive_failure += 1;
                state.consecutive_success = 0;
                state.consecutive_failure
            }
        };

        if result.status == state.current_status || reached < DEBOUNCE_THRESHOLD {
            return None;
        }

        state.current_status = result.status;
        state.status_since = result.timestamp;
        state.consecutive_success = 0;
        state.consecutive_failure = 0;

        Some(Transition {
            target_name: state.target_name.clone(),
            to: result.status,
            at: result.timestamp,
        })
    }
}
