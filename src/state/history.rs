//! Bounded in-memory time series of check results.

use super::models::CheckResult;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};

/// How long and how many results each series keeps.
#[derive(Debug, Clone, Copy)]
pub struct HistoryLimits {
    pub retention: ChronoDuration,
    pub max_entries: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            retention: ChronoDuration::hours(24),
            max_entries: 2880,
        }
    }
}

/// Per-target ordered series, oldest first.
#[derive(Debug, Default)]
pub struct HistoryStore {
    limits: HistoryLimits,
    series: HashMap<String, VecDeque<CheckResult>>,
}

impl HistoryStore {
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            limits,
            series: HashMap::new(),
        }
    }

    /// Append a result and prune its series.
    ///
    /// A result older than the series tail is inserted at its ordered position.
    pub fn append(&mut self, result: CheckResult) {
        let series = self.series.entry(result.target_name.clone()).or_default();

        match series.back() {
            Some(last) if result.timestamp < last.timestamp => {
                let idx = series.partition_point(|r| r.timestamp <= result.timestamp);
                series.insert(idx, result);
            }
            _ => series.push_back(result),
        }

        if let Some(newest) = series.back().map(|r| r.timestamp) {
            prune_series(series, newest - self.limits.retention, self.limits.max_entries);
        }
    }

    /// Drop expired entries from every series relative to `now`.
    ///
    /// Returns the number of entries removed.
    pub fn prune_all(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.limits.retention;
        let mut removed = 0;
        for series in self.series.values_mut() {
            let before = series.len();
            prune_series(series, cutoff, self.limits.max_entries);
            removed += before - series.len();
        }
        self.series.retain(|_, s| !s.is_empty());
        removed
    }

    /// One target's retained results, chronological.
    pub fn series(&self, name: &str, now: DateTime<Utc>) -> Vec<CheckResult> {
        let cutoff = now - self.limits.retention;
        self.series
            .get(name)
            .map(|s| s.iter().filter(|r| r.timestamp >= cutoff).cloned().collect())
            .unwrap_or_default()
    }

    /// All retained results across targets, chronological.
    pub fn all(&self, now: DateTime<Utc>) -> Vec<CheckResult> {
        let cutoff = now - self.limits.retention;
        let mut results: Vec<CheckResult> = self
            .series
            .values()
            .flat_map(|s| s.iter().filter(|r| r.timestamp >= cutoff).cloned())
            .collect();
        results.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.target_name.cmp(&b.target_name))
        });
        results
    }

    #[cfg(test)]
    pub fn len(&self, name: &str) -> usize {
        self.series.get(name).map(VecDeque::len).unwrap_or(0)
    }
}

fn prune_series(series: &mut VecDeque<CheckResult>, cutoff: DateTime<Utc>, max_entries: usize) {
    while series.front().is_some_and(|r| r.timestamp < cutoff) {
        series.pop_front();
    }
    while series.len() > max_entries {
        series.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 0, 0, 0).unwrap() + ChronoDuration::minutes(minutes)
    }

    fn result(name: &str, minutes: i64) -> CheckResult {
        CheckResult::up(name, t(minutes), 20)
    }

    #[test]
    fn test_append_and_read_chronological() {
        let mut store = HistoryStore::new(HistoryLimits::default());
        store.append(result("nginx", 0));
        store.append(result("nginx", 1));
        store.append(result("nginx", 2));

        let series = store.series("nginx", t(2));
        let times: Vec<_> = series.iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![t(0), t(1), t(2)]);
    }

    #[test]
    fn test_late_result_inserted_in_order() {
        let mut store = HistoryStore::new(HistoryLimits::default());
        store.append(result("nginx", 0));
        store.append(result("nginx", 5));
        store.append(result("nginx", 3));

        let times: Vec<_> = store.series("nginx", t(5)).iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![t(0), t(3), t(5)]);
    }

    #[test]
    fn test_append_prunes_beyond_horizon() {
        let mut store = HistoryStore::new(HistoryLimits::default());
        // 26 hours of hourly results
        for h in 0..=26 {
            store.append(result("nginx", h * 60));
        }

        let series = store.series("nginx", t(26 * 60));
        assert_eq!(series.first().unwrap().timestamp, t(2 * 60));
        assert_eq!(series.len(), 25);
        assert_eq!(store.len("nginx"), 25);
    }

    #[test]
    fn test_read_excludes_expired_without_append() {
        let mut store = HistoryStore::new(HistoryLimits::default());
        store.append(result("nginx", 0));
        store.append(result("nginx", 60));

        // Two hours past the horizon of the first entry only
        let series = store.series("nginx", t(24 * 60 + 30));
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].timestamp, t(60));
    }

    #[test]
    fn test_count_cap_evicts_oldest() {
        let limits = HistoryLimits {
            retention: ChronoDuration::hours(24),
            max_entries: 3,
        };
        let mut store = HistoryStore::new(limits);
        for m in 0..5 {
            store.append(result("nginx", m));
        }

        let times: Vec<_> = store.series("nginx", t(4)).iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![t(2), t(3), t(4)]);
    }

    #[test]
    fn test_prune_all() {
        let mut store = HistoryStore::new(HistoryLimits::default());
        store.append(result("nginx", 0));
        store.append(result("plex", 0));
        store.append(result("plex", 600));

        let removed = store.prune_all(t(25 * 60));
        assert_eq!(removed, 2);
        assert_eq!(store.len("nginx"), 0);
        assert_eq!(store.len("plex"), 1);
    }

    #[test]
    fn test_all_merges_targets_in_time_order() {
        let mut store = HistoryStore::new(HistoryLimits::default());
        store.append(result("plex", 2));
        store.append(result("nginx", 1));
        store.append(result("nginx", 3));
        store.append(result("autobrr", 2));

        let all = store.all(t(3));
        let order: Vec<_> = all.iter().map(|r| (r.target_name.as_str(), r.timestamp)).collect();
        assert_eq!(
            order,
            vec![("nginx", t(1)), ("autobrr", t(2)), ("plex", t(2)), ("nginx", t(3))]
        );
    }
}
