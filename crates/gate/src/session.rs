// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state machine shared by the dispatcher, refresh coordinator and
//! session monitor.
//!
//! ```text
//! LoggedOut --login--> Authenticated --401--> Refreshing --ok--> Authenticated
//!                            |                    |
//!                            +--logout/idle--+    +--failure--> LoggedOut
//!                                            v
//!                                        LoggedOut
//! ```
//!
//! Every transition happens under one lock together with its token-store
//! write, and bumps a generation counter on login/logout. A refresh that
//! started under an older generation can neither resurrect a logged-out
//! session nor clobber a newer login.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::error::GateError;
use crate::token::{TokenPair, TokenStore};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedOut,
    Authenticated,
    Refreshing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Explicit,
    Inactivity,
    RefreshFailed,
    SessionExpired,
}

/// Lifecycle events broadcast to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    Ended { reason: EndReason },
}

/// Shared session: token store + state + lifecycle events.
pub struct Session {
    store: TokenStore,
    state_tx: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<SessionEvent>,
    /// Bumped on every login and logout; guards transitions.
    generation: Mutex<u64>,
}

impl Session {
    /// Create a session over `store`. Always starts `LoggedOut`, even when the
    /// store holds persisted tokens; see [`Session::resume`].
    pub fn new(store: TokenStore) -> Self {
        let (state_tx, _) = watch::channel(SessionState::LoggedOut);
        let (event_tx, _) = broadcast::channel(64);
        Self { store, state_tx, event_tx, generation: Mutex::new(0) }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Start a new session with freshly issued tokens.
    pub fn begin(&self, tokens: TokenPair) {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.store.set(tokens);
        self.state_tx.send_replace(SessionState::Authenticated);
        let _ = self.event_tx.send(SessionEvent::LoggedIn);
        tracing::info!(generation = *generation, "session started");
    }

    /// Adopt tokens persisted by a previous run.
    ///
    /// Returns `true` if the session moved to `Authenticated`.
    pub fn resume(&self) -> bool {
        let generation = self.generation.lock();
        if self.state() != SessionState::LoggedOut || self.store.access().is_none() {
            return false;
        }
        self.state_tx.send_replace(SessionState::Authenticated);
        let _ = self.event_tx.send(SessionEvent::LoggedIn);
        tracing::info!(generation = *generation, "session resumed from persisted tokens");
        true
    }

    /// End the session: clear tokens and move to `LoggedOut`.
    ///
    /// Idempotent; returns `false` (and emits nothing) when already logged
    /// out. Tokens left over from a previous run are still wiped.
    pub fn end(&self, reason: EndReason) -> bool {
        let mut generation = self.generation.lock();
        if self.state() == SessionState::LoggedOut {
            if !self.store.get().is_empty() {
                self.store.clear();
                tracing::debug!("cleared tokens of a session that was never resumed");
            }
            return false;
        }
        *generation += 1;
        self.store.clear();
        self.state_tx.send_replace(SessionState::LoggedOut);
        let _ = self.event_tx.send(SessionEvent::Ended { reason });
        tracing::info!(?reason, generation = *generation, "session ended");
        true
    }

    /// Access token to attach to requests, if a session is live.
    ///
    /// Persisted tokens are not used until the session is resumed.
    pub fn access_token(&self) -> Option<String> {
        let _generation = self.generation.lock();
        if self.state() == SessionState::LoggedOut {
            return None;
        }
        self.store.access()
    }

    /// Enter `Refreshing`; returns the generation the refresh belongs to and
    /// the refresh token to spend.
    ///
    /// A logged-out session is never refreshed. A live session without a
    /// refresh token ends as expired.
    pub(crate) fn begin_refresh(&self) -> Result<(u64, String), GateError> {
        let mut generation = self.generation.lock();
        if self.state() == SessionState::LoggedOut {
            return Err(GateError::SessionExpired);
        }
        let Some(refresh) = self.store.refresh_token() else {
            *generation += 1;
            self.store.clear();
            self.state_tx.send_replace(SessionState::LoggedOut);
            let _ = self.event_tx.send(SessionEvent::Ended { reason: EndReason::SessionExpired });
            tracing::info!(generation = *generation, "session expired, no refresh token");
            return Err(GateError::SessionExpired);
        };
        self.state_tx.send_replace(SessionState::Refreshing);
        Ok((*generation, refresh))
    }

    /// Store a refreshed access token, unless the session changed meanwhile.
    ///
    /// Returns `false` if `generation` is stale; nothing is written then.
    pub(crate) fn commit_refresh(
        &self,
        generation: u64,
        access: &str,
        refresh: Option<&str>,
    ) -> bool {
        let current = self.generation.lock();
        if *current != generation || self.state() == SessionState::LoggedOut {
            return false;
        }
        self.store.set_access(access);
        if let Some(token) = refresh {
            self.store.set_refresh(token);
        }
        self.state_tx.send_replace(SessionState::Authenticated);
        let _ = self.event_tx.send(SessionEvent::Refreshed);
        true
    }

    /// Tear down the session after a failed refresh, unless it changed meanwhile.
    pub(crate) fn abort_refresh(&self, generation: u64, reason: EndReason) {
        let mut current = self.generation.lock();
        if *current != generation || self.state() == SessionState::LoggedOut {
            return;
        }
        *current += 1;
        self.store.clear();
        self.state_tx.send_replace(SessionState::LoggedOut);
        let _ = self.event_tx.send(SessionEvent::Ended { reason });
        tracing::info!(?reason, generation = *current, "session ended by refresh failure");
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
