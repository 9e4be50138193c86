//! Health endpoints of known self-hosted applications.

use super::ProbeKind;

/// How to ask an application whether it is healthy.
#[derive(Debug, PartialEq, Eq)]
pub struct AppCheck {
    pub app: &'static str,
    /// Appended when the configured URL has no path.
    pub path: &'static str,
    /// Accepted status codes; empty means any 2xx/3xx.
    pub accepted: &'static [u16],
    /// Lowercase text the response body must contain.
    pub body_contains: Option<&'static str>,
}

impl AppCheck {
    pub fn accepts(&self, status: u16) -> bool {
        if self.accepted.is_empty() {
            (200..400).contains(&status)
        } else {
            self.accepted.contains(&status)
        }
    }

    /// Check the body, returning the missing marker on failure.
    pub fn validate_body(&self, body: &str) -> Result<(), &'static str> {
        match self.body_contains {
            Some(marker) if !body.to_ascii_lowercase().contains(marker) => Err(marker),
            _ => Ok(()),
        }
    }
}

// Plex answers 401 without a token; qBittorrent answers 403 when the WebUI wants a login.
static APP_CHECKS: &[(ProbeKind, AppCheck)] = &[
    (ProbeKind::Plex, AppCheck { app: "plex", path: "/identity", accepted: &[200, 401], body_contains: None }),
    (ProbeKind::Radarr, AppCheck { app: "radarr", path: "/ping", accepted: &[200], body_contains: Some("ok") }),
    (ProbeKind::Sonarr, AppCheck { app: "sonarr", path: "/ping", accepted: &[200], body_contains: Some("ok") }),
    (ProbeKind::Prowlarr, AppCheck { app: "prowlarr", path: "/ping", accepted: &[200], body_contains: Some("ok") }),
    (ProbeKind::Tautulli, AppCheck { app: "tautulli", path: "/status", accepted: &[200], body_contains: None }),
    (ProbeKind::Overseerr, AppCheck { app: "overseerr", path: "/api/v1/status", accepted: &[200], body_contains: Some("version") }),
    (ProbeKind::Qbit, AppCheck { app: "qbit", path: "/api/v2/app/version", accepted: &[200, 403], body_contains: None }),
    (ProbeKind::Autobrr, AppCheck { app: "autobrr", path: "/api/healthz/liveness", accepted: &[200], body_contains: Some("ok") }),
    (ProbeKind::Flaresolverr, AppCheck { app: "flaresolverr", path: "/health", accepted: &[200], body_contains: Some("ok") }),
    (ProbeKind::Nginx, AppCheck { app: "nginx", path: "/", accepted: &[], body_contains: None }),
    (ProbeKind::Syncthing, AppCheck { app: "syncthing", path: "/rest/noauth/health", accepted: &[200], body_contains: Some("ok") }),
];

/// Look up the health check for an application kind.
pub fn app_check(kind: ProbeKind) -> Option<&'static AppCheck> {
    APP_CHECKS.iter().find(|(k, _)| *k == kind).map(|(_, check)| check)
}
