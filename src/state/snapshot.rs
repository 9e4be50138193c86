//! Read-only views of engine state for the API.

use super::downtime::DowntimeTracker;
use super::models::{CheckResult, DowntimeRow, Status};
use super::status::StatusTracker;
use crate::probe::{parse_host, Target};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One target as presented to the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceView {
    pub name: String,
    /// `up`, `down` or `redirect`.
    pub status: String,
    pub response_time_ms: Option<u64>,
    pub status_since: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: Option<u32>,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(rename = "type")]
    pub probe_type: String,
}

/// A target and the instances that declare it as their host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostGroup {
    pub name: String,
    pub address: Option<String>,
    pub instances: Vec<String>,
}

/// Point-in-time aggregation of every target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub services: Vec<ServiceView>,
    pub downtime_events: Vec<DowntimeRow>,
    pub categories: Vec<String>,
    pub interval: u64,
    pub uptime_percentage: Option<f64>,
    pub by_category: BTreeMap<String, Vec<String>>,
    pub hosts: Vec<HostGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub status: Status,
    pub response_time: Option<u64>,
}

/// Check history plus the downtime events over the same targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
    pub downtime_events: Vec<DowntimeRow>,
}

impl From<CheckResult> for HistoryEntry {
    fn from(r: CheckResult) -> Self {
        Self {
            name: r.target_name,
            timestamp: r.timestamp,
            status: r.status,
            response_time: r.response_time_ms,
        }
    }
}

impl HistoryResponse {
    pub fn new(results: Vec<CheckResult>, downtime_events: Vec<DowntimeRow>) -> Self {
        Self {
            history: results.into_iter().map(HistoryEntry::from).collect(),
            downtime_events,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Merge descriptors, debounced state and latest results into a [`Snapshot`].
pub fn build_snapshot(
    targets: &[Target],
    status: &StatusTracker,
    latest: &HashMap<String, CheckResult>,
    downtime: &DowntimeTracker,
    categories: &[String],
    interval: u64,
) -> Snapshot {
    let mut services = Vec::with_capacity(targets.len());
    let mut by_category: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut monitorable = 0usize;
    let mut up = 0usize;

    for target in targets {
        let cfg = &target.config;
        by_category
            .entry(cfg.category.clone())
            .or_default()
            .push(cfg.name.clone());

        let state = status.get(&cfg.name).filter(|_| target.is_monitorable());
        let last = latest.get(&cfg.name);

        if let Some(state) = state {
            monitorable += 1;
            if state.current_status == Status::Up {
                up += 1;
            }
        }

        services.push(ServiceView {
            name: cfg.name.clone(),
            status: match state {
                Some(s) => s.current_status.to_string(),
                None => "redirect".to_string(),
            },
            response_time_ms: last.and_then(|r| r.response_time_ms),
            status_since: state.map(|s| s.status_since),
            last_check: last.map(|r| r.timestamp),
            consecutive_failures: state.map(|s| s.consecutive_failure),
            category: cfg.category.clone(),
            host: cfg.host.as_deref().and_then(non_empty),
            public_url: non_empty(&cfg.public_url),
            icon_url: cfg.icon_url.as_deref().and_then(non_empty),
            probe_type: target.kind.to_string(),
        });
    }

    let uptime_percentage = if monitorable == 0 {
        None
    } else {
        Some(up as f64 / monitorable as f64 * 100.0)
    };

    Snapshot {
        services,
        downtime_events: downtime.events().map(|e| e.to_row()).collect(),
        categories: categories.to_vec(),
        interval,
        uptime_percentage,
        by_category,
        hosts: group_by_host(targets),
    }
}

/// Nest each target under the target its `host` field names, matched by
/// network address or by name.
pub fn group_by_host(targets: &[Target]) -> Vec<HostGroup> {
    let addresses: Vec<Option<String>> = targets
        .iter()
        .map(|t| t.checker.as_ref().and_then(|_| parse_host(&t.config.ping_url)))
        .collect();

    let mut groups: Vec<HostGroup> = Vec::new();
    for (i, parent) in targets.iter().enumerate() {
        let instances: Vec<String> = targets
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .filter(|(_, child)| {
                child.config.host.as_deref().is_some_and(|h| {
                    let h = h.trim();
                    !h.is_empty() && (h == parent.config.name || addresses[i].as_deref() == Some(h))
                })
            })
            .map(|(_, child)| child.config.name.clone())
            .collect();

        if !instances.is_empty() {
            groups.push(HostGroup {
                name: parent.config.name.clone(),
                address: addresses[i].clone(),
                instances,
            });
        }
    }
    groups
}
