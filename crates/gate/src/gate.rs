// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`AuthGate`]: the one handle collaborators hold.
//!
//! Wires a [`TokenStore`], [`RequestDispatcher`] and [`RefreshCoordinator`]
//! around one [`Session`], and starts the [`SessionMonitor`] on request.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::config::GateConfig;
use crate::dispatch::RequestDispatcher;
use crate::error::GateError;
use crate::monitor::{ActivityFeed, MonitorConfig, SessionMonitor};
use crate::refresh::{RefreshCoordinator, RefreshEndpoint};
use crate::session::{EndReason, Session, SessionEvent, SessionState};
use crate::storage::{FileStorage, Storage};
use crate::token::{TokenPair, TokenResponse, TokenStore};
use crate::transport::{HttpTransport, Request, Response, Transport};

/// Login credentials.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Endpoint and timing knobs for an [`AuthGate`].
#[derive(Debug, Clone)]
pub struct GateOptions {
    pub login_path: String,
    pub refresh: RefreshEndpoint,
    pub auth_scheme: String,
    pub monitor: MonitorConfig,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            login_path: "/user/token/".to_owned(),
            refresh: RefreshEndpoint::default(),
            auth_scheme: "Bearer".to_owned(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl From<&GateConfig> for GateOptions {
    fn from(config: &GateConfig) -> Self {
        Self {
            login_path: config.login_path.clone(),
            refresh: config.refresh_endpoint(),
            auth_scheme: config.auth_scheme.clone(),
            monitor: config.monitor(),
        }
    }
}

/// Authenticated transport for the issue-tracker API.
///
/// Cheap to clone. Separate gates share nothing, so tests can run several
/// side by side.
#[derive(Clone)]
pub struct AuthGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    dispatcher: RequestDispatcher,
    coordinator: RefreshCoordinator,
    activity: ActivityFeed,
    login_path: String,
    monitor: MonitorConfig,
}

impl AuthGate {
    /// Build a gate over `transport`, loading persisted tokens from `storage`.
    ///
    /// The gate starts `LoggedOut`; call [`AuthGate::resume`] to adopt
    /// persisted tokens or [`AuthGate::login`] for new ones.
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
        options: GateOptions,
    ) -> Self {
        let store = TokenStore::load(storage);
        let session = Arc::new(Session::new(store));
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&session), Arc::clone(&transport), options.refresh);
        let dispatcher = RequestDispatcher::new(
            Arc::clone(&session),
            Arc::clone(&transport),
            coordinator.clone(),
            options.auth_scheme,
        );
        Self {
            inner: Arc::new(GateInner {
                session,
                transport,
                dispatcher,
                coordinator,
                activity: ActivityFeed::new(),
                login_path: options.login_path,
                monitor: options.monitor,
            }),
        }
    }

    /// HTTP transport plus file-backed token storage, as configured.
    pub fn from_config(config: &GateConfig) -> Result<Self, GateError> {
        let storage = FileStorage::open(config.token_path())?;
        let transport = HttpTransport::new(config.base_url.clone(), config.request_timeout());
        Ok(Self::new(Arc::new(transport), Arc::new(storage), GateOptions::from(config)))
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// Watch session state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.session.subscribe()
    }

    /// Lifecycle events, including the session-ended signal.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.session.events()
    }

    pub fn tokens(&self) -> TokenPair {
        self.inner.session.store().get()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// Send `request` with the current access token. See [`RequestDispatcher::send`].
    pub async fn send(&self, request: Request) -> Result<Response, GateError> {
        self.inner.dispatcher.send(request).await
    }

    /// Exchange credentials for a token pair and start a session.
    ///
    /// The login call bypasses the dispatcher, so a rejected login never
    /// triggers a refresh.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), GateError> {
        let body = serde_json::to_value(credentials)?;
        let request = Request::post(self.inner.login_path.clone()).json(body);
        let resp = self.inner.transport.execute(&request).await?;
        if !resp.is_success() {
            tracing::warn!(status = resp.status, email = %credentials.email, "login rejected");
            return Err(GateError::Unauthorized { status: resp.status });
        }
        let tokens: TokenResponse = resp.json()?;
        self.inner.session.begin(tokens.into());
        tracing::info!(email = %credentials.email, "logged in");
        Ok(())
    }

    /// Adopt tokens persisted by a previous run. Returns `true` on success.
    pub fn resume(&self) -> bool {
        self.inner.session.resume()
    }

    /// End the session and clear stored tokens. Returns `false` when no
    /// session was live; leftover persisted tokens are wiped either way.
    pub fn logout(&self) -> bool {
        self.inner.session.end(EndReason::Explicit)
    }

    /// Feed one user interaction to the inactivity watchdog.
    pub fn record_activity(&self) {
        self.inner.activity.notify();
    }

    /// The activity source the monitor listens to, for external input layers.
    pub fn activity(&self) -> ActivityFeed {
        self.inner.activity.clone()
    }

    /// Start proactive refresh and the inactivity watchdog.
    ///
    /// The loops run until the returned handle is stopped or dropped.
    pub fn start_monitor(&self) -> SessionMonitor {
        SessionMonitor::start(
            Arc::clone(&self.inner.session),
            self.inner.coordinator.clone(),
            &self.inner.activity,
            self.inner.monitor,
        )
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
