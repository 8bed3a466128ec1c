// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};

use crate::config::GateConfig;

/// Authenticated client for the issue-tracker API.
#[derive(Debug, Parser)]
#[command(name = "tracker-gate", version)]
pub struct Cli {
    #[command(flatten)]
    pub gate: GateConfig,

    /// Log format (json or text).
    #[arg(long, env = "TRACKER_GATE_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "TRACKER_GATE_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and persist the issued tokens.
    Login {
        #[arg(long, env = "TRACKER_GATE_EMAIL")]
        email: String,
        #[arg(long, env = "TRACKER_GATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Send one authenticated request and print the response.
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE).
        method: String,
        /// Path relative to the base URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },
    /// Print the session state and which tokens are stored.
    Status,
    /// Clear stored tokens.
    Logout,
    /// Keep the session alive in the foreground. Each stdin line counts as
    /// user activity.
    Watch,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("--log-format must be json or text, got {}", self.log_format);
        }
        self.gate.validate()
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
