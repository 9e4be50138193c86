//! Downtime interval derivation from status transitions.

use super::models::{DowntimeEvent, Status, Transition};
use super::StateError;

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Maximum number of downtime events retained.
pub const MAX_DOWNTIME_EVENTS: usize = 50;

/// Global list of downtime events, most recent first.
#[derive(Debug)]
pub struct DowntimeTracker {
    events: VecDeque<DowntimeEvent>,
    capacity: usize,
}

impl Default for DowntimeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DowntimeTracker {
    pub fn new() -> Self {
        Self::with_capacity(MAX_DOWNTIME_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Dispatch a transition to open or close.
    pub fn on_transition(&mut self, transition: &Transition) -> Result<(), StateError> {
        match transition.to {
            Status::Down => self.open(&transition.target_name, transition.at),
            Status::Up => self.close(&transition.target_name, transition.at).map(|_| ()),
        }
    }

    /// Open a new event for `name`. Evicts the oldest event when full.
    pub fn open(&mut self, name: &str, start_ts: DateTime<Utc>) -> Result<(), StateError> {
        if self.open_event(name).is_some() {
            return Err(StateError::DowntimeAlreadyOpen(name.to_string()));
        }

        self.events.push_front(DowntimeEvent::open(name, start_ts));
        while self.events.len() > self.capacity {
            if let Some(evicted) = self.events.pop_back() {
                if evicted.is_open() {
                    tracing::warn!(
                        "Evicted open downtime event for {} started at {}",
                        evicted.target_name,
                        evicted.start_ts
                    );
                }
            }
        }
        Ok(())
    }

    /// Close the most recent open event for `name` and return it.
    pub fn close(&mut self, name: &str, end_ts: DateTime<Utc>) -> Result<&DowntimeEvent, StateError> {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.target_name == name && e.is_open())
            .ok_or_else(|| StateError::NoOpenDowntime(name.to_string()))?;

        event.end_ts = Some(end_ts);
        event.duration_minutes = Some((end_ts - event.start_ts).num_minutes());
        event.resolved = true;
        Ok(&*event)
    }

    pub fn open_event(&self, name: &str) -> Option<&DowntimeEvent> {
        self.events.iter().find(|e| e.target_name == name && e.is_open())
    }

    /// Events, most recent first.
    pub fn events(&self) -> impl Iterator<Item = &DowntimeEvent> {
        self.events.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn test_open_then_close() {
        let mut tracker = DowntimeTracker::new();
        tracker.open("sonarr", t(0)).unwrap();
        assert!(tracker.open_event("sonarr").is_some());

        let closed = tracker.close("sonarr", t(17)).unwrap();
        assert_eq!(closed.end_ts, Some(t(17)));
        assert_eq!(closed.duration_minutes, Some(17));
        assert!(closed.resolved);
        assert!(tracker.open_event("sonarr").is_none());
    }

    #[test]
    fn test_duration_rounds_down_to_whole_minutes() {
        let mut tracker = DowntimeTracker::new();
        tracker.open("sonarr", t(0)).unwrap();
        let closed = tracker.close("sonarr", t(2) + Duration::seconds(59)).unwrap();
        assert_eq!(closed.duration_minutes, Some(2));
    }

    #[test]
    fn test_second_open_is_refused() {
        let mut tracker = DowntimeTracker::new();
        tracker.open("sonarr", t(0)).unwrap();

        let err = tracker.open("sonarr", t(5)).unwrap_err();
        assert!(matches!(err, StateError::DowntimeAlreadyOpen(_)));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.open_event("sonarr").unwrap().start_ts, t(0));
    }

    #[test]
    fn test_close_without_open_is_refused() {
        let mut tracker = DowntimeTracker::new();
        let err = tracker.close("sonarr", t(5)).unwrap_err();
        assert!(matches!(err, StateError::NoOpenDowntime(_)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_most_recent_first() {
        let mut tracker = DowntimeTracker::new();
        tracker.open("sonarr", t(0)).unwrap();
        tracker.open("radarr", t(1)).unwrap();

        let names: Vec<_> = tracker.events().map(|e| e.target_name.as_str()).collect();
        assert_eq!(names, vec!["radarr", "sonarr"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut tracker = DowntimeTracker::new();
        for i in 0..50 {
            let name = format!("svc-{i}");
            tracker.open(&name, t(i)).unwrap();
            tracker.close(&name, t(i + 1)).unwrap();
        }
        assert_eq!(tracker.len(), 50);

        tracker.open("svc-50", t(100)).unwrap();
        assert_eq!(tracker.len(), 50);
        assert_eq!(tracker.events().next().unwrap().target_name, "svc-50");
        assert!(tracker.events().all(|e| e.target_name != "svc-0"));
        assert_eq!(tracker.events().last().unwrap().target_name, "svc-1");
    }

    #[test]
    fn test_transition_dispatch() {
        let mut tracker = DowntimeTracker::new();
        let down = Transition {
            target_name: "qbit".to_string(),
            to: Status::Down,
            at: t(0),
        };
        let up = Transition {
            target_name: "qbit".to_string(),
            to: Status::Up,
            at: t(3),
        };

        tracker.on_transition(&down).unwrap();
        tracker.on_transition(&up).unwrap();
        let event = tracker.events().next().unwrap();
        assert_eq!(event.start_ts, t(0));
        assert_eq!(event.end_ts, Some(t(3)));
    }
}
