// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::monitor::MonitorConfig;
use crate::refresh::RefreshEndpoint;

/// Configuration for the authenticated gate.
#[derive(Debug, Clone, clap::Args)]
pub struct GateConfig {
    /// API root every request path is joined onto.
    #[arg(long, default_value = "http://127.0.0.1:8000/api", env = "TRACKER_GATE_BASE_URL")]
    pub base_url: String,

    /// Path of the login (token obtain) endpoint.
    #[arg(long, default_value = "/user/token/", env = "TRACKER_GATE_LOGIN_PATH")]
    pub login_path: String,

    /// Path of the refresh endpoint.
    #[arg(long, default_value = "/user/token/refresh/", env = "TRACKER_GATE_REFRESH_PATH")]
    pub refresh_path: String,

    /// JSON field that carries the refresh token in the refresh body.
    #[arg(long, default_value = "refresh", env = "TRACKER_GATE_REFRESH_FIELD")]
    pub refresh_field: String,

    /// Authorization scheme prefix.
    #[arg(long, default_value = "Bearer", env = "TRACKER_GATE_AUTH_SCHEME")]
    pub auth_scheme: String,

    /// Proactive refresh period in seconds.
    #[arg(long, default_value_t = 840, env = "TRACKER_GATE_REFRESH_INTERVAL_SECS")]
    pub refresh_interval_secs: u64,

    /// Log out after this many seconds without user activity.
    #[arg(long, default_value_t = 900, env = "TRACKER_GATE_INACTIVITY_TIMEOUT_SECS")]
    pub inactivity_timeout_secs: u64,

    /// How often the inactivity watchdog checks, in seconds.
    #[arg(long, default_value_t = 60, env = "TRACKER_GATE_INACTIVITY_POLL_SECS")]
    pub inactivity_poll_secs: u64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, default_value_t = 30, env = "TRACKER_GATE_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Token file. Defaults to `<state dir>/tokens.json`.
    #[arg(long, env = "TRACKER_GATE_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,
}

impl GateConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            anyhow::bail!("--base-url must be an http(s) URL: {}", self.base_url);
        }
        let paths = [("--login-path", &self.login_path), ("--refresh-path", &self.refresh_path)];
        for (flag, path) in paths {
            if !path.starts_with('/') {
                anyhow::bail!("{flag} must start with '/': {path}");
            }
        }
        if self.refresh_field.is_empty() {
            anyhow::bail!("--refresh-field must not be empty");
        }
        if self.refresh_interval_secs == 0
            || self.inactivity_timeout_secs == 0
            || self.inactivity_poll_secs == 0
        {
            anyhow::bail!("monitor intervals must be non-zero");
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn inactivity_poll(&self) -> Duration {
        Duration::from_secs(self.inactivity_poll_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| state_dir().join("tokens.json"))
    }

    pub fn refresh_endpoint(&self) -> RefreshEndpoint {
        RefreshEndpoint { path: self.refresh_path.clone(), field: self.refresh_field.clone() }
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            refresh_interval: self.refresh_interval(),
            inactivity_timeout: self.inactivity_timeout(),
            inactivity_poll: self.inactivity_poll(),
        }
    }
}

/// Resolve the state directory for persisted tokens.
///
/// Checks `TRACKER_GATE_STATE_DIR`, then `$XDG_STATE_HOME/tracker-gate`,
/// then `$HOME/.local/state/tracker-gate`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TRACKER_GATE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("tracker-gate");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/tracker-gate");
    }
    PathBuf::from(".tracker-gate")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
