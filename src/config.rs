//! Configuration module for servicewatch.
//!
//! Process settings come from environment variables with sensible defaults;
//! monitored targets come from a JSON descriptor file validated at load.

use crate::probe::{CheckerRegistry, Target};
use crate::state::HistoryLimits;

use chrono::Duration as ChronoDuration;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Longest accepted history horizon.
pub const MAX_HISTORY_RETENTION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API (default: 5000)
    pub http_port: u16,
    /// Path to the target descriptor file (default: "config.json")
    pub config_path: PathBuf,
    /// Directory of a prebuilt frontend to serve, if any
    pub static_dir: Option<PathBuf>,
    /// Per-probe timeout (default: 5s)
    pub probe_timeout: Duration,
    /// Maximum probes in flight across all targets (default: 16)
    pub max_concurrency: usize,
    /// How far back check history is kept (default: 24h)
    pub history_retention: Duration,
    /// Per-target cap on retained results (default: 2880)
    pub history_max_entries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 5000,
            config_path: PathBuf::from("config.json"),
            static_dir: None,
            probe_timeout: Duration::from_secs(5),
            max_concurrency: 16,
            history_retention: Duration::from_secs(24 * 60 * 60),
            history_max_entries: 2880,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = env::var(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Ignoring invalid {}={:?}, keeping default", key, raw),
        }
    }
}

/// Positive, representable seconds.
fn parse_secs(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

fn env_secs(key: &str, target: &mut Duration) {
    if let Ok(raw) = env::var(key) {
        match parse_secs(&raw) {
            Some(value) => *target = value,
            None => tracing::warn!("Ignoring invalid {}={:?}, keeping default", key, raw),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SERVICEWATCH_HTTP_PORT`: HTTP port (default: 5000)
    /// - `SERVICEWATCH_CONFIG_PATH`: target descriptor file (default: "config.json")
    /// - `SERVICEWATCH_STATIC_DIR`: frontend directory to serve (default: unset)
    /// - `SERVICEWATCH_PROBE_TIMEOUT`: probe timeout in seconds (default: 5)
    /// - `SERVICEWATCH_MAX_CONCURRENCY`: concurrent probe cap (default: 16)
    /// - `SERVICEWATCH_HISTORY_RETENTION`: history horizon in seconds (default: 86400)
    /// - `SERVICEWATCH_HISTORY_MAX_ENTRIES`: per-target history cap (default: 2880)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        env_parse("SERVICEWATCH_HTTP_PORT", &mut cfg.http_port);
        env_parse("SERVICEWATCH_MAX_CONCURRENCY", &mut cfg.max_concurrency);
        env_parse("SERVICEWATCH_HISTORY_MAX_ENTRIES", &mut cfg.history_max_entries);
        env_secs("SERVICEWATCH_PROBE_TIMEOUT", &mut cfg.probe_timeout);
        env_secs("SERVICEWATCH_HISTORY_RETENTION", &mut cfg.history_retention);

        if let Ok(path) = env::var("SERVICEWATCH_CONFIG_PATH") {
            cfg.config_path = PathBuf::from(path);
        }
        if let Ok(dir) = env::var("SERVICEWATCH_STATIC_DIR") {
            if !dir.trim().is_empty() {
                cfg.static_dir = Some(PathBuf::from(dir));
            }
        }

        if cfg.history_retention > MAX_HISTORY_RETENTION {
            tracing::warn!(
                "SERVICEWATCH_HISTORY_RETENTION capped at {}s",
                MAX_HISTORY_RETENTION.as_secs()
            );
            cfg.history_retention = MAX_HISTORY_RETENTION;
        }
        cfg.max_concurrency = cfg.max_concurrency.max(1);
        cfg.history_max_entries = cfg.history_max_entries.max(1);
        cfg
    }

    /// History bounds for the store, with the horizon capped at
    /// [`MAX_HISTORY_RETENTION`].
    pub fn history_limits(&self) -> HistoryLimits {
        let capped = self.history_retention.min(MAX_HISTORY_RETENTION);
        HistoryLimits {
            retention: ChronoDuration::from_std(capped).unwrap_or_else(|_| ChronoDuration::days(365)),
            max_entries: self.history_max_entries.max(1),
        }
    }
}

/// Target descriptor errors. Any of these aborts startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config contains no groups")]
    Empty,
    #[error("group {0}: interval must be positive")]
    InvalidInterval(usize),
    #[error("target with empty name")]
    EmptyName,
    #[error("duplicate target name {0}")]
    DuplicateName(String),
    #[error("target {name}: unknown type {probe_type:?}")]
    UnknownType { name: String, probe_type: String },
    #[error("target {0}: ping_url is required")]
    MissingPingUrl(String),
    #[error("target {name}: invalid address {address:?}: {reason}")]
    InvalidAddress {
        name: String,
        address: String,
        reason: String,
    },
}

fn default_category() -> String {
    "unknown".to_string()
}

/// Immutable descriptor of one monitored target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub probe_type: String,
    #[serde(default)]
    pub ping_url: String,
    #[serde(default)]
    pub public_url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

/// One group as written in the descriptor file.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Seconds between check rounds.
    pub interval: u64,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub instances: Vec<TargetConfig>,
}

/// A validated group of targets sharing one check interval.
#[derive(Debug, Clone)]
pub struct Group {
    pub interval: Duration,
    pub categories: Vec<String>,
    pub targets: Vec<Target>,
}

/// The full validated monitoring configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub groups: Vec<Group>,
}

impl MonitorConfig {
    /// Read and validate a descriptor file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate descriptor JSON: an array of groups.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let groups: Vec<GroupConfig> = serde_json::from_str(raw)?;
        Self::from_groups(groups)
    }

    pub fn from_groups(groups: Vec<GroupConfig>) -> Result<Self, ConfigError> {
        if groups.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(groups.len());

        for (idx, group) in groups.into_iter().enumerate() {
            if group.interval == 0 {
                return Err(ConfigError::InvalidInterval(idx));
            }

            let mut targets = Vec::with_capacity(group.instances.len());
            for instance in &group.instances {
                if instance.name.trim().is_empty() {
                    return Err(ConfigError::EmptyName);
                }
                if !seen.insert(instance.name.clone()) {
                    return Err(ConfigError::DuplicateName(instance.name.clone()));
                }
                if !group.categories.is_empty() && !group.categories.contains(&instance.category) {
                    tracing::warn!(
                        "Target {} uses category {:?} not listed in its group",
                        instance.name,
                        instance.category
                    );
                }
                targets.push(CheckerRegistry::resolve(instance)?);
            }

            validated.push(Group {
                interval: Duration::from_secs(group.interval),
                categories: group.categories,
                targets,
            });
        }

        Ok(Self { groups: validated })
    }

    /// All targets in declaration order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.groups.iter().flat_map(|g| g.targets.iter())
    }

    /// Union of every group's categories, first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for category in self.groups.iter().flat_map(|g| g.categories.iter()) {
            if !out.contains(category) {
                out.push(category.clone());
            }
        }
        out
    }

    /// The shortest group interval.
    pub fn interval(&self) -> Duration {
        self.groups
            .iter()
            .map(|g| g.interval)
            .min()
            .unwrap_or(Duration::from_secs(60))
    }
}
