//! Probe module for service monitoring.
//!
//! Supports HTTP, named application, ICMP, TCP, SSH and WireGuard probes.
//! Target types are resolved once at load into a [`Checker`]; the
//! [`CheckerRegistry`] runs them with a bounded timeout and always yields a
//! [`CheckResult`].

mod apps;
mod http;
mod ping;
mod tcp;
mod udp;

pub use apps::*;
pub use http::*;
pub use ping::*;
pub use tcp::*;
pub use udp::*;

use crate::config::{ConfigError, TargetConfig};
use crate::state::CheckResult;

use chrono::Utc;
use reqwest::Url;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("command failed: {0}")]
    Command(String),
}

/// Declared target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Http,
    Ssh,
    Wireguard,
    Syncthing,
    Host,
    Port,
    Plex,
    Radarr,
    Sonarr,
    Tautulli,
    Overseerr,
    Qbit,
    Autobrr,
    Prowlarr,
    Flaresolverr,
    Nginx,
    Redirect,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 17] = [
        ProbeKind::Http,
        ProbeKind::Ssh,
        ProbeKind::Wireguard,
        ProbeKind::Syncthing,
        ProbeKind::Host,
        ProbeKind::Port,
        ProbeKind::Plex,
        ProbeKind::Radarr,
        ProbeKind::Sonarr,
        ProbeKind::Tautulli,
        ProbeKind::Overseerr,
        ProbeKind::Qbit,
        ProbeKind::Autobrr,
        ProbeKind::Prowlarr,
        ProbeKind::Flaresolverr,
        ProbeKind::Nginx,
        ProbeKind::Redirect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Http => "http",
            ProbeKind::Ssh => "ssh",
            ProbeKind::Wireguard => "wireguard",
            ProbeKind::Syncthing => "syncthing",
            ProbeKind::Host => "host",
            ProbeKind::Port => "port",
            ProbeKind::Plex => "plex",
            ProbeKind::Radarr => "radarr",
            ProbeKind::Sonarr => "sonarr",
            ProbeKind::Tautulli => "tautulli",
            ProbeKind::Overseerr => "overseerr",
            ProbeKind::Qbit => "qbit",
            ProbeKind::Autobrr => "autobrr",
            ProbeKind::Prowlarr => "prowlarr",
            ProbeKind::Flaresolverr => "flaresolverr",
            ProbeKind::Nginx => "nginx",
            ProbeKind::Redirect => "redirect",
        }
    }

    /// Whether targets of this kind count toward uptime and downtime.
    pub fn is_monitorable(&self) -> bool {
        *self != ProbeKind::Redirect
    }
}

impl FromStr for ProbeKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        ProbeKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target's probe, with its address already parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Checker {
    Http { url: Url },
    App { url: Url, check: &'static AppCheck },
    Host { host: String },
    Tcp { host: String, port: u16 },
    Ssh { host: String, port: u16 },
    Wireguard { host: String, port: u16 },
}

/// A validated target: its descriptor plus its resolved probe.
///
/// `checker` is `None` for redirect targets, which are never probed.
#[derive(Debug, Clone)]
pub struct Target {
    pub config: TargetConfig,
    pub kind: ProbeKind,
    pub checker: Option<Checker>,
}

impl Target {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_monitorable(&self) -> bool {
        self.kind.is_monitorable()
    }
}

/// Maps declared target types to probes and runs them.
pub struct CheckerRegistry {
    client: reqwest::Client,
    timeout: Duration,
}

impl CheckerRegistry {
    /// Create a registry whose probes all share `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Resolve a descriptor's declared type and address into a [`Target`].
    pub fn resolve(config: &TargetConfig) -> Result<Target, ConfigError> {
        let kind: ProbeKind = config.probe_type.parse().map_err(|_| ConfigError::UnknownType {
            name: config.name.clone(),
            probe_type: config.probe_type.clone(),
        })?;

        if kind == ProbeKind::Redirect {
            return Ok(Target {
                config: config.clone(),
                kind,
                checker: None,
            });
        }

        let address = config.ping_url.trim();
        if address.is_empty() {
            return Err(ConfigError::MissingPingUrl(config.name.clone()));
        }

        let invalid = |reason: &str| ConfigError::InvalidAddress {
            name: config.name.clone(),
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let checker = match kind {
            ProbeKind::Http => Checker::Http {
                url: parse_http_url(address).map_err(|e| invalid(&e))?,
            },
            ProbeKind::Host => Checker::Host {
                host: parse_host(address).ok_or_else(|| invalid("missing host"))?,
            },
            ProbeKind::Port => {
                let (host, port) = parse_host_port(address).map_err(|e| invalid(&e))?;
                Checker::Tcp { host, port }
            }
            ProbeKind::Ssh => {
                let (host, port) = parse_host_port(address).map_err(|e| invalid(&e))?;
                Checker::Ssh { host, port }
            }
            ProbeKind::Wireguard => {
                let (host, port) = parse_host_port(address).map_err(|e| invalid(&e))?;
                Checker::Wireguard { host, port }
            }
            ProbeKind::Syncthing if !has_http_scheme(address) => {
                let (host, port) = parse_host_port(address).map_err(|e| invalid(&e))?;
                Checker::Tcp { host, port }
            }
            _ => {
                let check = app_check(kind).ok_or_else(|| invalid("no health check defined"))?;
                let mut url = parse_http_url(address).map_err(|e| invalid(&e))?;
                if url.path().is_empty() || url.path() == "/" {
                    url.set_path(check.path);
                }
                Checker::App { url, check }
            }
        };

        Ok(Target {
            config: config.clone(),
            kind,
            checker: Some(checker),
        })
    }

    /// Probe a target once.
    ///
    /// Returns `None` for redirect targets. Every failure, including timeout
    /// expiry, becomes a down result.
    pub async fn probe(&self, target: &Target) -> Option<CheckResult> {
        let checker = target.checker.as_ref()?;
        let name = target.name();
        let timestamp = Utc::now();

        let outcome = match tokio::time::timeout(self.timeout, self.run(checker)).await {
            Ok(r) => r,
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        };

        let result = match outcome {
            Ok(latency) => CheckResult::up(name, timestamp, latency.as_millis() as u64),
            Err(e) => {
                match &e {
                    ProbeError::Protocol(_) | ProbeError::Status(_) => {
                        tracing::warn!("Probe for {} ({}) got unexpected response: {}", name, target.kind, e)
                    }
                    _ => tracing::debug!("Probe for {} ({}) failed: {}", name, target.kind, e),
                }
                CheckResult::down(name, timestamp, e.to_string())
            }
        };

        Some(result)
    }

    async fn run(&self, checker: &Checker) -> Result<Duration, ProbeError> {
        match checker {
            Checker::Http { url } => run_http_probe(&self.client, url, self.timeout).await,
            Checker::App { url, check } => run_app_probe(&self.client, url, check, self.timeout).await,
            Checker::Host { host } => run_ping_probe(host, self.timeout).await,
            Checker::Tcp { host, port } => run_tcp_probe(host, *port).await,
            Checker::Ssh { host, port } => run_ssh_probe(host, *port).await,
            Checker::Wireguard { host, port } => run_wireguard_probe(host, *port).await,
        }
    }
}

fn has_http_scheme(address: &str) -> bool {
    address.starts_with("http://") || address.starts_with("https://")
}

fn strip_scheme(address: &str) -> &str {
    address
        .strip_prefix("http://")
        .or_else(|| address.strip_prefix("https://"))
        .unwrap_or(address)
}

/// Parse an HTTP(S) URL, assuming `http://` when no scheme is given.
fn parse_http_url(address: &str) -> Result<Url, String> {
    let url = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&url).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err("missing host".to_string()),
        other => Err(format!("unsupported scheme {}", other)),
    }
}

/// Extract the bare host from a URL, `host:port` or plain host.
pub(crate) fn parse_host(address: &str) -> Option<String> {
    let rest = strip_scheme(address.trim());
    let rest = rest.split('/').next().unwrap_or_default();

    if rest.parse::<std::net::IpAddr>().is_ok() {
        return Some(rest.to_string());
    }

    let host = if let Some(bracketed) = rest.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        rest.split(':').next().unwrap_or_default()
    };

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Parse `host:port`, tolerating a scheme prefix and a trailing path.
fn parse_host_port(address: &str) -> Result<(String, u16), String> {
    let rest = strip_scheme(address.trim());
    let rest = rest.split('/').next().unwrap_or_default();

    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| "expected host:port".to_string())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err("missing host".to_string());
    }

    let port: u16 = port
        .parse()
        .map_err(|_| format!("invalid port number: {}", port))?;
    if port == 0 {
        return Err("port must be non-zero".to_string());
    }

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, probe_type: &str, ping_url: &str) -> TargetConfig {
        TargetConfig {
            name: name.to_string(),
            probe_type: probe_type.to_string(),
            ping_url: ping_url.to_string(),
            public_url: String::new(),
            category: "media".to_string(),
            host: None,
            icon_url: None,
        }
    }

    #[test]
    fn test_probe_kind_from_str() {
        for kind in ProbeKind::ALL {
            assert_eq!(kind.as_str().parse::<ProbeKind>(), Ok(kind));
        }
        assert_eq!("Plex".parse::<ProbeKind>(), Ok(ProbeKind::Plex));
        assert!("gopher".parse::<ProbeKind>().is_err());
    }

    #[test]
    fn test_resolve_unknown_type() {
        let err = CheckerRegistry::resolve(&target("x", "gopher", "10.0.0.1")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownType { .. }));
    }

    #[test]
    fn test_resolve_redirect_without_ping_url() {
        let resolved = CheckerRegistry::resolve(&target("docs", "redirect", "")).unwrap();
        assert_eq!(resolved.kind, ProbeKind::Redirect);
        assert!(resolved.checker.is_none());
        assert!(!resolved.is_monitorable());
    }

    #[test]
    fn test_resolve_missing_ping_url() {
        let err = CheckerRegistry::resolve(&target("web", "http", "  ")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPingUrl(_)));
    }

    #[test]
    fn test_resolve_http_adds_scheme() {
        let resolved = CheckerRegistry::resolve(&target("web", "http", "10.0.0.5:8080")).unwrap();
        match resolved.checker {
            Some(Checker::Http { url }) => assert_eq!(url.as_str(), "http://10.0.0.5:8080/"),
            other => panic!("unexpected checker {:?}", other),
        }
    }

    #[test]
    fn test_resolve_app_appends_health_path() {
        let resolved = CheckerRegistry::resolve(&target("radarr", "radarr", "http://10.0.0.5:7878")).unwrap();
        match resolved.checker {
            Some(Checker::App { url, check }) => {
                assert_eq!(url.as_str(), "http://10.0.0.5:7878/ping");
                assert_eq!(check.app, "radarr");
            }
            other => panic!("unexpected checker {:?}", other),
        }
    }

    #[test]
    fn test_resolve_app_keeps_explicit_path() {
        let resolved =
            CheckerRegistry::resolve(&target("plex", "plex", "http://10.0.0.5:32400/web/index.html")).unwrap();
        match resolved.checker {
            Some(Checker::App { url, .. }) => assert_eq!(url.path(), "/web/index.html"),
            other => panic!("unexpected checker {:?}", other),
        }
    }

    #[test]
    fn test_resolve_syncthing_forms() {
        let relay = CheckerRegistry::resolve(&target("relay", "syncthing", "10.0.0.9:22067")).unwrap();
        assert_eq!(
            relay.checker,
            Some(Checker::Tcp {
                host: "10.0.0.9".to_string(),
                port: 22067
            })
        );

        let gui = CheckerRegistry::resolve(&target("sync", "syncthing", "https://sync.lan")).unwrap();
        assert!(matches!(gui.checker, Some(Checker::App { .. })));
    }

    #[test]
    fn test_resolve_port_requires_port() {
        let err = CheckerRegistry::resolve(&target("db", "port", "10.0.0.5")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));

        let err = CheckerRegistry::resolve(&target("db", "ssh", "10.0.0.5:ssh")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn test_resolve_rejects_bad_scheme() {
        let err = CheckerRegistry::resolve(&target("ftp", "http", "ftp://10.0.0.5")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn test_parse_host() {
        assert_eq!(parse_host("192.168.1.1"), Some("192.168.1.1".to_string()));
        assert_eq!(parse_host("http://nas.lan:5000/ui"), Some("nas.lan".to_string()));
        assert_eq!(parse_host("fe80::1"), Some("fe80::1".to_string()));
        assert_eq!(parse_host("[fe80::1]:22"), Some("fe80::1".to_string()));
        assert_eq!(parse_host("http://"), None);
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(parse_host_port("10.0.0.1:22"), Ok(("10.0.0.1".to_string(), 22)));
        assert_eq!(parse_host_port("https://vpn.lan:51820"), Ok(("vpn.lan".to_string(), 51820)));
        assert_eq!(parse_host_port("[::1]:2222"), Ok(("::1".to_string(), 2222)));
        assert!(parse_host_port("10.0.0.1:0").is_err());
        assert!(parse_host_port(":22").is_err());
    }

    #[tokio::test]
    async fn test_probe_redirect_is_skipped() {
        let registry = CheckerRegistry::new(Duration::from_secs(1)).unwrap();
        let resolved = CheckerRegistry::resolve(&target("docs", "redirect", "")).unwrap();
        assert!(registry.probe(&resolved).await.is_none());
    }

    #[tokio::test]
    async fn test_probe_refused_port_is_down() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let registry = CheckerRegistry::new(Duration::from_secs(2)).unwrap();
        let resolved = CheckerRegistry::resolve(&target("db", "port", &format!("127.0.0.1:{port}"))).unwrap();
        let result = registry.probe(&resolved).await.unwrap();
        assert!(!result.is_up());
        assert!(result.error.is_some());
        assert_eq!(result.response_time_ms, None);
    }

    #[tokio::test]
    async fn test_probe_times_out_on_silent_ssh() {
        // Accepts connections but never sends a banner
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let registry = CheckerRegistry::new(Duration::from_millis(200)).unwrap();
        let resolved = CheckerRegistry::resolve(&target("box", "ssh", &format!("127.0.0.1:{port}"))).unwrap();
        let result = registry.probe(&resolved).await.unwrap();
        assert!(!result.is_up());
        assert!(result.error.unwrap().contains("timed out"));
        server.abort();
    }
}
