//! The engine's single owned state aggregate.

use super::downtime::DowntimeTracker;
use super::history::{HistoryLimits, HistoryStore};
use super::models::{CheckResult, Status, Transition};
use super::snapshot::{build_snapshot, HistoryResponse, Snapshot};
use super::status::StatusTracker;
use crate::config::MonitorConfig;
use crate::probe::Target;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

struct EngineState {
    status: StatusTracker,
    history: HistoryStore,
    downtime: DowntimeTracker,
    latest: HashMap<String, CheckResult>,
}

/// Thread-safe in-memory store shared by the scheduler and the API.
///
/// One coarse lock guards all mutable state; it is never held across
/// network I/O.
pub struct Store {
    targets: Vec<Target>,
    categories: Vec<String>,
    interval_secs: u64,
    state: RwLock<EngineState>,
}

impl Store {
    /// Build fresh state for every configured target.
    ///
    /// Monitorable targets start `down` as of `started_at`, each with an open
    /// downtime event.
    pub fn new(config: &MonitorConfig, limits: HistoryLimits, started_at: DateTime<Utc>) -> Self {
        let targets: Vec<Target> = config.targets().cloned().collect();
        let monitorable: Vec<&str> = targets
            .iter()
            .filter(|t| t.is_monitorable())
            .map(|t| t.name())
            .collect();

        let status = StatusTracker::new(monitorable.iter().copied(), started_at);
        let mut downtime = DowntimeTracker::new();
        for name in &monitorable {
            if let Err(e) = downtime.open(name, started_at) {
                tracing::error!("Failed to open initial downtime event: {}", e);
            }
        }

        Self {
            categories: config.categories(),
            interval_secs: config.interval().as_secs(),
            state: RwLock::new(EngineState {
                status,
                history: HistoryStore::new(limits),
                downtime,
                latest: HashMap::new(),
            }),
            targets,
        }
    }

    /// Apply one probe result: history, latest result, debounce and downtime.
    ///
    /// Returns the status transition this result confirmed, if any.
    pub async fn record(&self, result: CheckResult) -> Option<Transition> {
        let mut state = self.state.write().await;

        if !state.status.contains(&result.target_name) {
            tracing::warn!("Dropping result for unmonitored target {}", result.target_name);
            return None;
        }

        let transition = state.status.apply(&result);
        if let Some(t) = &transition {
            match t.to {
                Status::Up => tracing::info!("{} is now UP (since {})", t.target_name, t.at),
                Status::Down => tracing::warn!(
                    "{} is now DOWN (since {}): {}",
                    t.target_name,
                    t.at,
                    result.error.as_deref().unwrap_or("unknown")
                ),
            }
            if let Err(e) = state.downtime.on_transition(t) {
                tracing::error!("Downtime tracking invariant violated: {}", e);
            }
        }

        let newer = state
            .latest
            .get(&result.target_name)
            .map_or(true, |prev| prev.timestamp <= result.timestamp);
        if newer {
            state.latest.insert(result.target_name.clone(), result.clone());
        }
        state.history.append(result);

        transition
    }

    /// Point-in-time view of every target.
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        build_snapshot(
            &self.targets,
            &state.status,
            &state.latest,
            &state.downtime,
            &self.categories,
            self.interval_secs,
        )
    }

    /// Retained history as of `now`, chronological, with the downtime events
    /// read under the same lock. `name` restricts both to one target.
    pub async fn history(&self, name: Option<&str>, now: DateTime<Utc>) -> HistoryResponse {
        let state = self.state.read().await;
        let results = match name {
            Some(name) => state.history.series(name, now),
            None => state.history.all(now),
        };
        let downtime_events = state
            .downtime
            .events()
            .filter(|e| name.map_or(true, |n| e.target_name == n))
            .map(|e| e.to_row())
            .collect();
        HistoryResponse::new(results, downtime_events)
    }

    /// Retained history of one target, chronological, as of `now`.
    #[cfg(test)]
    pub async fn target_history(&self, name: &str, now: DateTime<Utc>) -> Vec<CheckResult> {
        let state = self.state.read().await;
        state.history.series(name, now)
    }

    /// Drop expired history. Returns the number of entries removed.
    pub async fn prune_history(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write().await;
        state.history.prune_all(now)
    }

    /// Number of downtime events currently open for `name` (0 or 1).
    #[cfg(test)]
    pub async fn open_downtime_count(&self, name: &str) -> usize {
        let state = self.state.read().await;
        state
            .downtime
            .events()
            .filter(|e| e.target_name == name && e.is_open())
            .count()
    }
}
