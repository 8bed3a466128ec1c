// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracker-gate: authenticated transport for the issue-tracker API.
//!
//! Attaches bearer tokens, refreshes them single-flight on 401, replays the
//! failed request once, and keeps the session alive (or ends it) in the
//! background.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod monitor;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod token;
pub mod transport;

#[cfg(test)]
mod test_support;

use tokio::io::AsyncBufReadExt;

pub use crate::dispatch::RequestDispatcher;
pub use crate::error::GateError;
pub use crate::gate::{AuthGate, Credentials, GateOptions};
pub use crate::monitor::{ActivityFeed, MonitorConfig, SessionMonitor};
pub use crate::refresh::{RefreshCoordinator, RefreshEndpoint};
pub use crate::session::{EndReason, SessionEvent, SessionState};
pub use crate::storage::{FileStorage, MemoryStorage, Storage};
pub use crate::token::{TokenPair, TokenStore};
pub use crate::transport::{HttpTransport, Method, Request, Response, Transport};

use crate::cli::{Cli, Command};

/// Run one CLI command to completion.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let gate = AuthGate::from_config(&cli.gate)?;

    match cli.command {
        Command::Login { email, password } => {
            gate.login(&Credentials::new(email, password)).await?;
            println!("logged in");
        }
        Command::Request { method, path, body } => {
            require_session(&gate)?;
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            let mut request = Request::new(method, path);
            if let Some(ref body) = body {
                request = request.json(serde_json::from_str(body)?);
            }
            let resp = gate.send(request).await?;
            println!("{}", resp.status);
            println!("{}", resp.text());
        }
        Command::Status => {
            gate.resume();
            let tokens = gate.tokens();
            let status = serde_json::json!({
                "state": gate.state(),
                "access_token": tokens.access.is_some(),
                "refresh_token": tokens.refresh.is_some(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Logout => {
            gate.resume();
            let ended = gate.logout();
            println!("{}", if ended { "logged out" } else { "not logged in" });
        }
        Command::Watch => {
            require_session(&gate)?;
            watch(&gate).await?;
        }
    }
    Ok(())
}

fn require_session(gate: &AuthGate) -> anyhow::Result<()> {
    if !gate.resume() {
        anyhow::bail!("not logged in (run `tracker-gate login` first)");
    }
    Ok(())
}

/// Run the session monitor until the session ends or Ctrl-C.
async fn watch(gate: &AuthGate) -> anyhow::Result<()> {
    let mut events = gate.events();
    let monitor = gate.start_monitor();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    tracing::info!("watching session; each input line counts as activity");

    let reason = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break None,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => gate.record_activity(),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(err = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
            event = events.recv() => match event {
                Ok(SessionEvent::Ended { reason }) => break Some(reason),
                Ok(event) => tracing::debug!(?event, "session event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "session events lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break None,
            },
        }
    };

    monitor.shutdown().await;
    match reason {
        Some(reason) => println!("session ended: {}", serde_json::to_string(&reason)?),
        None => println!("stopped"),
    }
    Ok(())
}
